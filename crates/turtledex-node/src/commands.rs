pub mod chain_info;
pub mod check;
pub mod export_blocks;
pub mod import_blocks;
pub mod tail_changes;
