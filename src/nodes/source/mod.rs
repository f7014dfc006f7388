mod loop_player;

pub use loop_player::*;
