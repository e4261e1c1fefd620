//! Hashed key mutex: serialize work on arbitrary string keys against a
//! fixed pool of locks. Different keys may hash to the same lock; order
//! within one key is guaranteed, unrelated keys are occasionally serialized
//! together but can never deadlock.

use tokio::sync::{Mutex, MutexGuard};

/// 32-bit FNV-1a.
pub fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in data {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// 64-bit FNV-1a.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

pub struct KeyMutex {
    locks: Vec<Mutex<()>>,
}

impl KeyMutex {
    /// Pool sized to the available parallelism.
    pub fn new() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_locks(n)
    }

    pub fn with_locks(n: usize) -> Self {
        let n = n.max(1);
        Self {
            locks: (0..n).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Acquire the lock that `key` hashes to. Held for the guard's lifetime.
    /// Nested acquisition on the same key deadlocks; callers must not do it.
    pub async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let index = fnv1a_32(key.as_bytes()) as usize % self.locks.len();
        self.locks[index].lock().await
    }
}

impl Default for KeyMutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn fnv1a_known_vectors() {
        // Reference values for the FNV-1a test suite inputs.
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[tokio::test]
    async fn same_key_is_mutually_exclusive() {
        let mutex = Arc::new(KeyMutex::with_locks(4));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mutex = Arc::clone(&mutex);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = mutex.lock("chat-1").await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_can_overlap() {
        // With a pool large enough that these keys land on different locks,
        // holding one must not block the other.
        let mutex = KeyMutex::with_locks(64);
        let (key_a, key_b) = distinct_slot_keys(64);

        let _guard = mutex.lock(&key_a).await;
        tokio::time::timeout(Duration::from_millis(100), mutex.lock(&key_b))
            .await
            .expect("second key should not be blocked");
    }

    fn distinct_slot_keys(pool: usize) -> (String, String) {
        let first = "k0".to_string();
        let slot = fnv1a_32(first.as_bytes()) as usize % pool;
        for i in 1..1000 {
            let candidate = format!("k{i}");
            if fnv1a_32(candidate.as_bytes()) as usize % pool != slot {
                return (first, candidate);
            }
        }
        unreachable!("no distinct slot found");
    }
}
