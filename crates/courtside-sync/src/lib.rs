// Library root: everything that talks to the game server. Configuration,
// the WebSocket transport and REST client, the realtime channel manager, the
// optimistic mutation coordinator and the session loop that ties them to the
// pure mirror in `courtside-core`.

pub mod api;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod protocol;
pub mod session;
pub mod transport;
