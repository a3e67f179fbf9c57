//! Server state: users, channels, and the registry that indexes them.

mod channel;
mod user;
mod world;

pub use channel::{Channel, ChannelModes, Topic};
pub use user::{PingProbe, SessionState, Uid, User, UserModes, SENDQ_LINES};
pub use world::World;
