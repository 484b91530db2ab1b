pub mod inspect;
pub mod select;
pub mod topology;
