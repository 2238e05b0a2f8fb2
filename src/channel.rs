use crate::codec::extract_text;
use crate::{BridgeError, Result};
use memmap2::{MmapOptions, MmapRaw};
use std::cell::UnsafeCell;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

/// Payload bytes per slot (matches the ingest receive buffer).
pub const SLOT_CAPACITY: usize = 1024;

const MAGIC: u32 = 0x5042_4348; // "PBCH"
const LAYOUT_VERSION: u32 = 1;

#[repr(C)]
struct Header {
    magic: AtomicU32,
    version: AtomicU32,
    /// Index of the slot holding the newest complete message.
    active: AtomicU32,
    _reserved: u32,
    /// Stamp of the newest published message (0 = none yet).
    published: AtomicU64,
    /// Stamp of the last message the consumer took.
    consumed: AtomicU64,
}

#[repr(C)]
struct Slot {
    /// Odd while the producer is writing this slot.
    seq: AtomicU64,
    stamp: AtomicU64,
    len: AtomicU32,
    _reserved: u32,
    data: UnsafeCell<[u8; SLOT_CAPACITY]>,
}

#[repr(C)]
struct Region {
    header: Header,
    slots: [Slot; 2],
}

/// Size of the mapped region in bytes.
pub const REGION_SIZE: usize = std::mem::size_of::<Region>();

/// Named shared-memory channel carrying the latest pose message from the
/// network process to the frame loop.
///
/// The region holds two slots. The producer always fills the slot that is not
/// active, guarding it with a per-slot sequence counter, then flips the active
/// index. The consumer copies the active slot and discards the copy if the
/// counter moved underneath it. Neither side ever blocks; a message the
/// consumer has not taken yet is simply replaced by a newer one.
///
/// One producer and one consumer per region. Both sides open the same name;
/// whichever comes first creates and sizes the backing file.
pub struct Channel {
    name: String,
    path: PathBuf,
    map: MmapRaw,
    /// Stamp of the last message returned by `read`.
    last_seen: u64,
}

impl Channel {
    /// Open (or create) the channel `name` in the default directory.
    pub fn open(name: &str) -> Result<Channel> {
        Self::open_in(&default_dir(), name)
    }

    /// Open (or create) the channel `name` inside `dir`.
    pub fn open_in(dir: &Path, name: &str) -> Result<Channel> {
        validate_name(name)?;
        std::fs::create_dir_all(dir).map_err(|e| BridgeError::channel(name, e))?;

        let path = dir.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| BridgeError::channel(name, e))?;

        let len = file
            .metadata()
            .map_err(|e| BridgeError::channel(name, e))?
            .len();
        if len < REGION_SIZE as u64 {
            file.set_len(REGION_SIZE as u64)
                .map_err(|e| BridgeError::channel(name, e))?;
        }

        let map = MmapOptions::new()
            .len(REGION_SIZE)
            .map_raw(&file)
            .map_err(|e| BridgeError::channel(name, e))?;

        let mut channel = Channel {
            name: name.to_string(),
            path,
            map,
            last_seen: 0,
        };
        channel.init_layout()?;
        // Deliver a message that was published but never taken.
        channel.last_seen = channel.region().header.consumed.load(Ordering::Acquire);

        log::info!(
            "Opened channel '{}' at {} ({} bytes)",
            channel.name,
            channel.path.display(),
            REGION_SIZE
        );
        Ok(channel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing file of the mapping.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publish `text` as the newest message. Returns its stamp.
    ///
    /// Producer side only. Replaces any message the consumer has not read yet.
    pub fn write(&self, text: &str) -> Result<u64> {
        let bytes = text.as_bytes();
        if bytes.len() > SLOT_CAPACITY {
            return Err(BridgeError::MessageTooLarge {
                len: bytes.len(),
                capacity: SLOT_CAPACITY,
            });
        }

        let region = self.region();
        let header = &region.header;
        let target = (header.active.load(Ordering::Acquire) as usize + 1) % region.slots.len();
        let slot = &region.slots[target];
        let stamp = header.published.load(Ordering::Acquire) + 1;

        let begin = slot.seq.load(Ordering::Relaxed) | 1;
        slot.seq.store(begin, Ordering::Relaxed);
        fence(Ordering::Release);

        // SAFETY: `target` is not the active slot, so the consumer only looks at
        // it after a flip; a racing copy is caught by the sequence check in `read`.
        unsafe {
            let dst = slot.data.get() as *mut u8;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
            if bytes.len() < SLOT_CAPACITY {
                dst.add(bytes.len()).write(0);
            }
        }
        slot.len.store(bytes.len() as u32, Ordering::Relaxed);
        slot.stamp.store(stamp, Ordering::Relaxed);
        slot.seq.store(begin.wrapping_add(1), Ordering::Release);

        header.active.store(target as u32, Ordering::Release);
        header.published.store(stamp, Ordering::Release);
        Ok(stamp)
    }

    /// Take the newest message if one arrived since the last call.
    ///
    /// Consumer side only. Never blocks: returns `None` when nothing new was
    /// published, or when the producer was mid-write (the next call picks the
    /// message up).
    pub fn read(&mut self) -> Option<String> {
        let region = self.region();
        let header = &region.header;
        if header.published.load(Ordering::Acquire) == self.last_seen {
            return None;
        }

        let index = header.active.load(Ordering::Acquire) as usize % region.slots.len();
        let slot = &region.slots[index];
        let begin = slot.seq.load(Ordering::Acquire);
        if begin & 1 == 1 {
            log::trace!("Channel '{}': slot {} mid-write, retry next tick", self.name, index);
            return None;
        }

        let stamp = slot.stamp.load(Ordering::Relaxed);
        let len = (slot.len.load(Ordering::Relaxed) as usize).min(SLOT_CAPACITY);
        let mut buf = vec![0u8; len];
        // SAFETY: the slot lives inside the mapping for the lifetime of `self`;
        // a concurrent overwrite is detected below and the copy discarded.
        unsafe {
            std::ptr::copy_nonoverlapping(slot.data.get() as *const u8, buf.as_mut_ptr(), len);
        }
        fence(Ordering::Acquire);
        if slot.seq.load(Ordering::Relaxed) != begin {
            log::trace!("Channel '{}': torn read of slot {}, dropped", self.name, index);
            return None;
        }
        if stamp == self.last_seen {
            return None;
        }

        header.consumed.store(stamp, Ordering::Release);
        self.last_seen = stamp;
        Some(extract_text(&buf))
    }

    /// Consumer view: a message newer than the last one read is waiting.
    pub fn has_pending(&self) -> bool {
        self.region().header.published.load(Ordering::Acquire) != self.last_seen
    }

    /// Producer view: the consumer has taken every published message.
    pub fn is_free(&self) -> bool {
        let header = &self.region().header;
        header.published.load(Ordering::Acquire) == header.consumed.load(Ordering::Acquire)
    }

    fn init_layout(&self) -> Result<()> {
        let header = &self.region().header;
        if header.magic.load(Ordering::Acquire) == 0 {
            header.version.store(LAYOUT_VERSION, Ordering::Relaxed);
            // Losing this race to the other process is fine: it wrote the same values.
            let _ = header
                .magic
                .compare_exchange(0, MAGIC, Ordering::AcqRel, Ordering::Acquire);
            log::debug!("Channel '{}': initialized fresh region", self.name);
        }

        let magic = header.magic.load(Ordering::Acquire);
        if magic != MAGIC {
            return Err(BridgeError::channel(
                &self.name,
                format!("region has foreign magic 0x{:08x}", magic),
            ));
        }
        let version = header.version.load(Ordering::Acquire);
        if version != LAYOUT_VERSION {
            return Err(BridgeError::channel(
                &self.name,
                format!("layout version {} (expected {})", version, LAYOUT_VERSION),
            ));
        }
        Ok(())
    }

    fn region(&self) -> &Region {
        // SAFETY: the mapping is REGION_SIZE bytes, page aligned, and outlives
        // the borrow. Every shared field is atomic or behind UnsafeCell.
        unsafe { &*(self.map.as_ptr() as *const Region) }
    }
}

/// Directory holding channel files: `/dev/shm` on Linux, else the temp dir.
pub fn default_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if cfg!(target_os = "linux") && shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// Channel names are single path components.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(BridgeError::channel(name, "invalid channel name"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

    /// Unique channel name in the temp dir; removes the file on drop.
    pub(crate) struct TempChannel {
        pub name: String,
        pub dir: PathBuf,
    }

    impl TempChannel {
        pub fn new(tag: &str) -> Self {
            let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
            TempChannel {
                name: format!("posebridge-test-{}-{}-{}", std::process::id(), tag, id),
                dir: std::env::temp_dir(),
            }
        }

        pub fn open(&self) -> Channel {
            Channel::open_in(&self.dir, &self.name).unwrap()
        }
    }

    impl Drop for TempChannel {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(self.dir.join(&self.name));
        }
    }

    #[test]
    fn test_write_then_read() {
        let tmp = TempChannel::new("rw");
        let producer = tmp.open();
        let mut consumer = tmp.open();

        assert!(producer.is_free());
        assert!(!consumer.has_pending());
        assert_eq!(consumer.read(), None);

        producer.write(r#"{"id":0}"#).unwrap();
        assert!(!producer.is_free());
        assert!(consumer.has_pending());
        assert_eq!(consumer.read().as_deref(), Some(r#"{"id":0}"#));

        // Consumed exactly once.
        assert!(producer.is_free());
        assert!(!consumer.has_pending());
        assert_eq!(consumer.read(), None);
    }

    #[test]
    fn test_latest_write_wins() {
        let tmp = TempChannel::new("latest");
        let producer = tmp.open();
        let mut consumer = tmp.open();

        producer.write("first").unwrap();
        producer.write("second").unwrap();
        producer.write("third").unwrap();

        assert_eq!(consumer.read().as_deref(), Some("third"));
        assert_eq!(consumer.read(), None);
    }

    #[test]
    fn test_shorter_message_does_not_leak_old_bytes() {
        let tmp = TempChannel::new("short");
        let producer = tmp.open();
        let mut consumer = tmp.open();

        producer.write("a much longer message").unwrap();
        producer.write("x").unwrap();
        producer.write("yy").unwrap();
        assert_eq!(consumer.read().as_deref(), Some("yy"));
    }

    #[test]
    fn test_oversized_message_rejected() {
        let tmp = TempChannel::new("big");
        let producer = tmp.open();
        let text = "x".repeat(SLOT_CAPACITY + 1);
        match producer.write(&text) {
            Err(BridgeError::MessageTooLarge { len, capacity }) => {
                assert_eq!(len, SLOT_CAPACITY + 1);
                assert_eq!(capacity, SLOT_CAPACITY);
            }
            other => panic!("expected MessageTooLarge, got {:?}", other),
        }
        // Exactly full is fine.
        producer.write(&"y".repeat(SLOT_CAPACITY)).unwrap();
    }

    #[test]
    fn test_late_consumer_sees_unread_message() {
        let tmp = TempChannel::new("late");
        let producer = tmp.open();
        producer.write("pending").unwrap();

        let mut consumer = tmp.open();
        assert_eq!(consumer.read().as_deref(), Some("pending"));

        // A second consumer handle opened afterwards starts caught up.
        let mut reopened = tmp.open();
        assert_eq!(reopened.read(), None);
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", ".", "..", "a/b", "a\\b"] {
            match Channel::open_in(&std::env::temp_dir(), name) {
                Err(BridgeError::ChannelUnavailable { .. }) => {}
                other => panic!(
                    "expected ChannelUnavailable for {:?}, got {:?}",
                    name,
                    other.err()
                ),
            }
        }
    }

    #[test]
    fn test_foreign_region_rejected() {
        let tmp = TempChannel::new("foreign");
        std::fs::write(tmp.dir.join(&tmp.name), vec![0xAB; REGION_SIZE]).unwrap();
        match Channel::open_in(&tmp.dir, &tmp.name) {
            Err(BridgeError::ChannelUnavailable { name, .. }) => assert_eq!(name, tmp.name),
            other => panic!("expected ChannelUnavailable, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_concurrent_reads_are_never_torn() {
        let tmp = TempChannel::new("race");
        let producer = tmp.open();
        let mut consumer = tmp.open();
        const COUNT: usize = 20_000;

        let writer = std::thread::spawn(move || {
            for i in 0..COUNT {
                // Payload is the digit repeated, so a torn copy mixes digits.
                let digit = char::from(b'0' + (i % 10) as u8);
                let body: String = std::iter::repeat(digit).take(200 + i % 300).collect();
                producer.write(&format!("{}:{}", i, body)).unwrap();
            }
        });

        let mut last = None;
        let mut received = 0;
        while !writer.is_finished() || consumer.has_pending() {
            if let Some(text) = consumer.read() {
                let (index, body) = text.split_once(':').unwrap();
                let index: usize = index.parse().unwrap();
                let digit = char::from(b'0' + (index % 10) as u8);
                assert_eq!(body.len(), 200 + index % 300);
                assert!(body.chars().all(|c| c == digit), "torn message {}", index);
                if let Some(prev) = last {
                    assert!(index > prev, "stale message {} after {}", index, prev);
                }
                last = Some(index);
                received += 1;
            }
        }
        writer.join().unwrap();

        assert!(received > 0);
        assert_eq!(last, Some(COUNT - 1));
    }
}
