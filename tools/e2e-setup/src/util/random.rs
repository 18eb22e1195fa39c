/*!
   Utilities for random value generation.
*/

use rand::Rng;

/// Generates a random `u32` value.
pub fn random_u32() -> u32 {
    let mut rng = rand::thread_rng();
    rng.gen()
}

/// Generates a random `u64` value.
pub fn random_u64() -> u64 {
    let mut rng = rand::thread_rng();
    rng.gen()
}

/// Generates a random hex string, used to name test resources uniquely.
pub fn random_string() -> String {
    format!("{:x}", random_u64())
}
