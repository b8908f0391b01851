use std::io;

/// Types that know how to write their own frame body.
pub trait Serialize {
    /// Appends the encoded body of `self` to `buf`.
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()>;
}
