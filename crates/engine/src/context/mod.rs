//! Bundle assembly under a token budget.
//!
//! | Priority | Items | On overflow |
//! |----------|-------|-------------|
//! | 1 | Resolved entity | Assembly stops |
//! | 2 | Definition rules | Assembly stops |
//! | 3 | Mechanism rules | Assembly stops |
//! | 4 | Supporting rules | Assembly stops |

pub mod assembler;
pub mod token;

pub use assembler::{AssemblyInput, BudgetAssembler, TokenBudget};
