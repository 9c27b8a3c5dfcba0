pub mod cost;
pub mod decision;
pub mod order;
pub mod outcome;
