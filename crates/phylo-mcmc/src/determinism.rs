use phylo_core::derive_substream_seed;

/// Derives the deterministic seed used for a specific chain.
pub fn chain_seed(master_seed: u64, chain_index: usize) -> u64 {
    derive_substream_seed(master_seed, chain_index as u64)
}

/// Derives the deterministic seed for a single sampling iteration.
///
/// Resumed runs derive the same seed for the same `(chain, sample)` pair, so a
/// checkpointed run continues on the exact trajectory of an uninterrupted one.
pub fn iteration_seed(master_seed: u64, chain_index: usize, sample: i64) -> u64 {
    derive_substream_seed(chain_seed(master_seed, chain_index), sample as u64)
}

/// Deterministic identifier for exchange proposals between tempered chains.
pub fn exchange_seed(master_seed: u64, epoch: u64, pair_index: usize) -> u64 {
    derive_substream_seed(master_seed ^ 0xA5A5_A5A5_A5A5_A5A5, epoch << 16 | pair_index as u64)
}
