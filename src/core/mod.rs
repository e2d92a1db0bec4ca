pub mod bouncer;
pub mod inode_store;
pub mod metadata;
pub mod taxonomy;
pub mod vpath;
