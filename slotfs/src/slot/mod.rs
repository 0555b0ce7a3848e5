pub mod slot_file;
pub mod slot_fs;
pub mod slot_layout;
