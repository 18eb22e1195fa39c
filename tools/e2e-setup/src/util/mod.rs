/*!
   Utility functions and types used by the setup helpers.
*/

pub mod assert;
pub mod random;
pub mod retry;
