/// Wire types shared by the pollhub HTTP layer and its clients.
pub mod api;
