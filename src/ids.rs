use crate::store::{CounterStore, Record, Repository};

pub fn format_id(prefix: &str, n: u64, padding: usize) -> String {
    format!("{prefix}{n:0padding$}")
}

/// Numeric suffix of an id issued under `prefix`, if it is one of ours.
fn id_number(id: &str, prefix: &str) -> Option<u64> {
    let digits = id.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Hands out `PREFIX0001`-style ids from a persisted monotonic counter.
///
/// The counter never goes below the collection size or the highest id
/// already present, so ids keep climbing across deletions and across
/// documents written before counters existed.
#[derive(Debug)]
pub struct IdAllocator {
    counter: &'static str,
    prefix: String,
    padding: usize,
    last: u64,
    issued: usize,
}

impl IdAllocator {
    pub fn load<T: Record>(
        repo: &dyn Repository<T>,
        counters: &dyn CounterStore,
        prefix: &str,
        padding: usize,
    ) -> anyhow::Result<IdAllocator> {
        let existing = repo.list()?;
        let highest = existing
            .iter()
            .filter_map(|e| id_number(e.key(), prefix))
            .max()
            .unwrap_or(0);
        let stored = counters.get(T::COLLECTION)?.unwrap_or(0);
        let last = stored.max(highest).max(existing.len() as u64);
        Ok(IdAllocator {
            counter: T::COLLECTION,
            prefix: prefix.to_string(),
            padding,
            last,
            issued: 0,
        })
    }

    pub fn next_id(&mut self) -> String {
        self.last += 1;
        self.issued += 1;
        format_id(&self.prefix, self.last, self.padding)
    }

    pub fn issued(&self) -> usize {
        self.issued
    }

    /// Persists the high-water mark. Call once the records are stored.
    pub fn commit(&self, counters: &mut dyn CounterStore) -> anyhow::Result<()> {
        if self.issued == 0 {
            return Ok(());
        }
        counters.set(self.counter, self.last)
    }
}

/// Allocates and commits a single id.
pub fn next_id<T: Record>(
    repo: &dyn Repository<T>,
    counters: &mut dyn CounterStore,
    prefix: &str,
    padding: usize,
) -> anyhow::Result<String> {
    let mut alloc = IdAllocator::load(repo, &*counters, prefix, padding)?;
    let id = alloc.next_id();
    alloc.commit(counters)?;
    Ok(id)
}
