//! PLN-style inference: named domain rules, premise deduction, multi-hop
//! graph search, rule chaining and concept explanations.

mod engine;
mod rules;

pub use engine::*;
pub use rules::*;
