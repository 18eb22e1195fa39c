/*!
   Declarative description of the chains, relayers and links that make up
   a test environment.

   The actual container work is done by the chain and relayer handles;
   this module only decides in which order they are driven.
*/

pub mod interchain;
