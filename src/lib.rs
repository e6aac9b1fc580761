pub mod comhand;
pub mod machine;
pub mod programs;
pub mod terminal;
