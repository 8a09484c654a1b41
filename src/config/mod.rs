pub mod assets;
pub mod bot;

pub use assets::AssetUniverse;
pub use bot::{clamp_poll_interval, BotConfig};
