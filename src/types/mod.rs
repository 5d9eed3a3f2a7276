pub mod bbox;
pub mod raw_member;
pub mod source;
pub mod tag_value;
