/*!
   Definitions of data types shared across the setup helpers.
*/

pub mod config;
pub mod context;
pub mod env;
