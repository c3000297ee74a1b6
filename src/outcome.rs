//! Deterministic outcome generation.
//!
//! A pure map from `(server_seed, client_seed, nonce)` to a pseudo-random
//! byte stream: block `i` is SHA-256 of
//! `"<server_seed_hex>:<client_seed>:<nonce>:<i>"`. Anyone holding the
//! revealed server seed can replay the stream and recompute any outcome,
//! which is the external fairness contract.
//!
//! Integer draws use rejection sampling so no value range carries modulo
//! bias.

use sha2::{Digest, Sha256};

/// Streaming byte source for one round.
pub struct OutcomeStream {
    prefix: String,
    block_index: u64,
    block: [u8; 32],
    offset: usize,
}

impl OutcomeStream {
    pub fn new(server_seed: &[u8; 32], client_seed: &str, nonce: u64) -> Self {
        let mut stream = Self {
            prefix: format!("{}:{}:{}", hex::encode(server_seed), client_seed, nonce),
            block_index: 0,
            block: [0u8; 32],
            offset: 0,
        };
        stream.block = stream.compute_block(0);
        stream
    }

    fn compute_block(&self, index: u64) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.prefix.as_bytes());
        hasher.update(b":");
        hasher.update(index.to_string().as_bytes());
        hasher.finalize().into()
    }

    pub fn next_byte(&mut self) -> u8 {
        if self.offset == self.block.len() {
            self.block_index += 1;
            self.block = self.compute_block(self.block_index);
            self.offset = 0;
        }
        let byte = self.block[self.offset];
        self.offset += 1;
        byte
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        for b in bytes.iter_mut() {
            *b = self.next_byte();
        }
        u32::from_be_bytes(bytes)
    }

    /// Uniform draw in `0..n` via rejection sampling.
    ///
    /// Draws above the largest multiple of `n` are discarded; each retry
    /// consumes four fresh stream bytes, keeping the result reproducible.
    pub fn next_u32_below(&mut self, n: u32) -> u32 {
        assert!(n > 0, "draw range must be nonzero");
        let span = 1u64 << 32;
        let zone = span - (span % n as u64);
        loop {
            let v = self.next_u32();
            if (v as u64) < zone {
                return v % n;
            }
        }
    }

    /// `count` distinct positions from `0..total`, via a partial
    /// Fisher-Yates shuffle driven by the stream. Returned sorted.
    pub fn pick_distinct(&mut self, count: u8, total: u8) -> Vec<u8> {
        assert!(count <= total, "cannot pick more positions than exist");
        let mut pool: Vec<u8> = (0..total).collect();
        for i in 0..count as usize {
            let remaining = (total as usize - i) as u32;
            let j = i + self.next_u32_below(remaining) as usize;
            pool.swap(i, j);
        }
        let mut picked: Vec<u8> = pool[..count as usize].to_vec();
        picked.sort_unstable();
        picked
    }
}

/// Mine placement for a Mines round; pure, replayable by a third party.
pub fn mine_positions(
    server_seed: &[u8; 32],
    client_seed: &str,
    nonce: u64,
    total_tiles: u8,
    mines_count: u8,
) -> Vec<u8> {
    OutcomeStream::new(server_seed, client_seed, nonce).pick_distinct(mines_count, total_tiles)
}

/// Single roll in `0..sides` for collapsed single-step modes.
pub fn roll(server_seed: &[u8; 32], client_seed: &str, nonce: u64, sides: u32) -> u32 {
    OutcomeStream::new(server_seed, client_seed, nonce).next_u32_below(sides)
}
