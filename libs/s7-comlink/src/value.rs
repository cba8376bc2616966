//! Wire value codec
//!
//! S7 transfers multi-byte values most significant byte first. Only 16 and
//! 32 bit values are reordered; bits and bytes pass through unchanged.

/// Value type that can be read from or written to an S7 address
///
/// `SIZE` must equal the byte size of the addressed region, which is the
/// check the client performs before accepting a job.
pub trait S7Value: Copy + Send + 'static {
    /// Byte width on the wire
    const SIZE: usize;

    /// S7 type name (BOOL, BYTE, WORD, ...)
    const TYPE_NAME: &'static str;

    /// Decode from a wire buffer of at least `SIZE` bytes
    fn from_wire(buf: &[u8]) -> Self;

    /// Encode into a wire buffer of at least `SIZE` bytes
    fn to_wire(self, buf: &mut [u8]);

    /// Same value with its bytes in wire order in host memory
    ///
    /// Identity for single byte types.
    fn wire_order(self) -> Self {
        self
    }

    /// Encode into a freshly allocated buffer
    fn to_wire_vec(self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.to_wire(&mut buf);
        buf
    }
}

/// Reorder a host value into wire byte order, keeping its type
pub fn to_wire_order<T: S7Value>(value: T) -> T {
    value.wire_order()
}

/// Inverse of [`to_wire_order`]
pub fn from_wire_order<T: S7Value>(value: T) -> T {
    value.wire_order()
}

fn array<const N: usize>(buf: &[u8]) -> [u8; N] {
    let mut raw = [0u8; N];
    raw.copy_from_slice(&buf[..N]);
    raw
}

impl S7Value for bool {
    const SIZE: usize = 1;
    const TYPE_NAME: &'static str = "BOOL";

    fn from_wire(buf: &[u8]) -> Self {
        buf[0] != 0
    }

    fn to_wire(self, buf: &mut [u8]) {
        buf[0] = u8::from(self);
    }
}

impl S7Value for u8 {
    const SIZE: usize = 1;
    const TYPE_NAME: &'static str = "BYTE";

    fn from_wire(buf: &[u8]) -> Self {
        buf[0]
    }

    fn to_wire(self, buf: &mut [u8]) {
        buf[0] = self;
    }
}

impl S7Value for i8 {
    const SIZE: usize = 1;
    const TYPE_NAME: &'static str = "SINT";

    fn from_wire(buf: &[u8]) -> Self {
        buf[0] as i8
    }

    fn to_wire(self, buf: &mut [u8]) {
        buf[0] = self as u8;
    }
}

macro_rules! impl_be_value {
    ($ty:ty, $size:expr, $name:expr) => {
        impl S7Value for $ty {
            const SIZE: usize = $size;
            const TYPE_NAME: &'static str = $name;

            fn from_wire(buf: &[u8]) -> Self {
                <$ty>::from_be_bytes(array::<$size>(buf))
            }

            fn to_wire(self, buf: &mut [u8]) {
                buf[..$size].copy_from_slice(&self.to_be_bytes());
            }

            fn wire_order(self) -> Self {
                <$ty>::from_ne_bytes(self.to_be_bytes())
            }
        }
    };
}

impl_be_value!(u16, 2, "WORD");
impl_be_value!(i16, 2, "INT");
impl_be_value!(u32, 4, "DWORD");
impl_be_value!(i32, 4, "DINT");
impl_be_value!(f32, 4, "REAL");
