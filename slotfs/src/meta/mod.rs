pub mod config_block;
pub mod meta_block;
pub mod recovery;
