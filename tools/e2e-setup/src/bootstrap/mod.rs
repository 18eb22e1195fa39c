/*!
   Helper functions for setting up test environments.

   Most tests only need
   [`standard_two_chain_environment`](two_chain::standard_two_chain_environment),
   which creates two chains linked by a relayer. Tests with other needs
   can assemble an [`Interchain`](crate::framework::interchain::Interchain)
   themselves from the same building blocks.
*/

pub mod init;
pub mod two_chain;
