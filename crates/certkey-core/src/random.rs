use rand::RngCore;

/// Cryptographically secure byte source used for salts.
pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]);

    fn bytes(&self, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        self.fill_bytes(&mut out);
        out
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(dest);
    }
}
