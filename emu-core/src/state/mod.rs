mod translation_table;
pub use self::translation_table::*;
