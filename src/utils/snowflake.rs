use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// 2024-09-05T00:00:00Z
const EPOCH: u64 = 1_725_494_400_000u64;
const COUNTER_BITS: u64 = 12;
const WORKER_BITS: u64 = 5;
const SERVER_BITS: u64 = 5;

pub const MAX_SERVER_ID: u8 = (1u8 << SERVER_BITS) - 1;

#[derive(Debug)]
struct GeneratorState {
    last_ts: u64,
    counter: u64,
}

/// Time ordered 63 bit ids: `timestamp | worker | server | counter`.
#[derive(Debug)]
pub struct IdGenerator {
    state: Mutex<GeneratorState>,
    server_id: u8,
    worker_id: u64,
}

impl IdGenerator {
    /// Ids wrap both numbers into their bit width.
    pub fn new(server_id: u8, worker_id: u64) -> Self {
        Self {
            state: Mutex::new(GeneratorState {
                last_ts: 0,
                counter: 0,
            }),
            server_id: server_id & MAX_SERVER_ID,
            worker_id: worker_id & ((1 << WORKER_BITS) - 1),
        }
    }

    fn current_time_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(EPOCH)
    }

    pub fn generate(&self) -> i64 {
        let seq_mask = (1u64 << COUNTER_BITS) - 1;

        let (ts, counter) = loop {
            let mut st = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Self::current_time_ms().saturating_sub(EPOCH);

            // clock went backwards, wait for it
            if now < st.last_ts {
                drop(st);
                thread::sleep(Duration::from_millis(1));
                continue;
            }

            if now == st.last_ts {
                if st.counter < seq_mask {
                    st.counter += 1;
                    break (st.last_ts, st.counter);
                }
                drop(st);
                thread::sleep(Duration::from_millis(1));
                continue;
            }

            st.last_ts = now;
            st.counter = 0;
            break (now, 0);
        };

        let id = (ts << (COUNTER_BITS + SERVER_BITS + WORKER_BITS))
            | (self.worker_id << (COUNTER_BITS + SERVER_BITS))
            | ((self.server_id as u64) << COUNTER_BITS)
            | (counter & seq_mask);
        (id & i64::MAX as u64) as i64
    }

    /// Moment an id was generated, millisecond precision.
    pub fn created_at(id: i64) -> DateTime<Utc> {
        let ms = ((id as u64) >> (COUNTER_BITS + SERVER_BITS + WORKER_BITS)) + EPOCH;
        DateTime::from_timestamp_millis(ms as i64).unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn server_id(id: i64) -> u8 {
        (((id as u64) >> COUNTER_BITS) & ((1 << SERVER_BITS) - 1)) as u8
    }
}

const WORKER_SLOTS: usize = 1 << WORKER_BITS;

static WORKER_COUNTER: AtomicUsize = AtomicUsize::new(0);
static SERVER_ID: AtomicU8 = AtomicU8::new(0);

/// One generator per worker id. Threads beyond the 32 ids the layout holds
/// share a slot, and its lock keeps their ids apart.
static GENERATORS: LazyLock<Vec<IdGenerator>> = LazyLock::new(|| {
    let server_id = SERVER_ID.load(Ordering::Relaxed);
    (0..WORKER_SLOTS as u64)
        .map(|worker| IdGenerator::new(server_id, worker))
        .collect()
});

thread_local! {
    static WORKER_SLOT: usize = WORKER_COUNTER.fetch_add(1, Ordering::Relaxed) % WORKER_SLOTS;
}

/// Must run before the first id is generated on any thread.
pub fn set_server_id(server_id: u8) {
    SERVER_ID.store(server_id & MAX_SERVER_ID, Ordering::Relaxed);
}

/// New id from the generator of this thread's worker slot.
pub fn generate_id() -> i64 {
    let slot = WORKER_SLOT.with(|slot| *slot);
    GENERATORS[slot].generate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_increasing() {
        let generator = IdGenerator::new(3, 1);
        let mut seen = HashSet::new();
        let mut last = 0;
        for _ in 0..10_000 {
            let id = generator.generate();
            assert!(id > last);
            assert!(seen.insert(id));
            last = id;
        }
    }

    #[test]
    fn server_id_and_timestamp_survive_encoding() {
        let before = Utc::now().timestamp_millis();
        let id = IdGenerator::new(7, 2).generate();
        let after = Utc::now().timestamp_millis();

        assert_eq!(IdGenerator::server_id(id), 7);
        let at = IdGenerator::created_at(id).timestamp_millis();
        assert!(at >= before && at <= after);
    }

    #[test]
    fn thread_generators_do_not_collide() {
        let handles: Vec<_> = (0..4)
            .map(|_| thread::spawn(|| (0..500).map(|_| generate_id()).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
    }

    #[test]
    fn more_threads_than_worker_ids_do_not_collide() {
        let handles: Vec<_> = (0..WORKER_SLOTS * 2 + 3)
            .map(|_| thread::spawn(|| (0..200).map(|_| generate_id()).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
    }
}
