use std::io;

/// Types that can be rebuilt from a complete frame body.
pub trait Deserialize: Sized {
    fn deserialize(buf: &[u8]) -> io::Result<Self>;
}
