/*!
   Chain configuration and the handles used to drive test chains.
*/

pub mod config;
pub mod cosmos;
pub mod handle;
pub mod node_config;
