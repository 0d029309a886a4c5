pub mod command;
pub mod device;
pub mod history;
pub mod observation;
pub mod prelude;
