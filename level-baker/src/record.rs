use byteorder::{ByteOrder, NativeEndian};

/// A fixed-size record that serializes itself field by field.
pub trait Record {
    const SIZE: usize;

    fn write_to(&self, buf: &mut RecordBuffer);
}

/// A growable byte buffer of tightly packed, native-endian records of one size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordBuffer {
    data: Vec<u8>,
    record_size: usize,
}

impl RecordBuffer {
    pub fn new(record_size: usize) -> Self {
        assert!(record_size > 0);
        Self {
            data: Vec::new(),
            record_size,
        }
    }

    pub fn for_record<R: Record>() -> Self {
        Self::new(R::SIZE)
    }

    pub fn push<R: Record>(&mut self, record: &R) {
        assert_eq!(R::SIZE, self.record_size);
        let start = self.data.len();
        record.write_to(self);
        assert_eq!(
            self.data.len() - start,
            R::SIZE,
            "record wrote the wrong number of bytes",
        );
    }

    pub fn count(&self) -> usize {
        self.data.len() / self.record_size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the bytes of record `index`.
    pub fn record(&self, index: usize) -> &[u8] {
        &self.data[index * self.record_size..][..self.record_size]
    }

    /// Moves every record out of `other` onto the end of this buffer.
    pub fn append(&mut self, other: &mut RecordBuffer) {
        assert_eq!(self.record_size, other.record_size);
        self.data.append(&mut other.data);
    }

    pub fn u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn i8(&mut self, value: i8) {
        self.data.push(value as u8);
    }

    pub fn u16(&mut self, value: u16) {
        let mut buf = [0; 2];
        NativeEndian::write_u16(&mut buf, value);
        self.data.extend_from_slice(&buf);
    }

    pub fn i16(&mut self, value: i16) {
        let mut buf = [0; 2];
        NativeEndian::write_i16(&mut buf, value);
        self.data.extend_from_slice(&buf);
    }

    pub fn f32(&mut self, value: f32) {
        let mut buf = [0; 4];
        NativeEndian::write_f32(&mut buf, value);
        self.data.extend_from_slice(&buf);
    }
}

#[cfg(test)]
mod tests {
    use byteorder::{ByteOrder, NativeEndian};

    use super::{Record, RecordBuffer};

    struct Pair {
        a: u16,
        b: f32,
    }

    impl Record for Pair {
        const SIZE: usize = 6;

        fn write_to(&self, buf: &mut RecordBuffer) {
            buf.u16(self.a);
            buf.f32(self.b);
        }
    }

    struct Short;

    impl Record for Short {
        const SIZE: usize = 6;

        fn write_to(&self, buf: &mut RecordBuffer) {
            buf.u8(1);
        }
    }

    #[test]
    fn packs_records_without_padding() {
        let mut buf = RecordBuffer::for_record::<Pair>();
        buf.push(&Pair { a: 0x1234, b: 1.5 });
        buf.push(&Pair { a: 7, b: -2.0 });

        assert_eq!(buf.count(), 2);
        assert_eq!(buf.data().len(), 12);
        let second = buf.record(1);
        assert_eq!(NativeEndian::read_u16(&second[..2]), 7);
        assert_eq!(NativeEndian::read_f32(&second[2..]), -2.0);
    }

    #[test]
    fn append_moves_records() {
        let mut a = RecordBuffer::for_record::<Pair>();
        let mut b = RecordBuffer::for_record::<Pair>();
        a.push(&Pair { a: 1, b: 0.0 });
        b.push(&Pair { a: 2, b: 0.0 });
        b.push(&Pair { a: 3, b: 0.0 });
        a.append(&mut b);

        assert_eq!(a.count(), 3);
        assert!(b.is_empty());
        assert_eq!(NativeEndian::read_u16(a.record(2)), 3);
    }

    #[test]
    #[should_panic(expected = "wrong number of bytes")]
    fn short_records_are_rejected() {
        RecordBuffer::for_record::<Short>().push(&Short);
    }

    #[test]
    fn signed_fields() {
        let mut buf = RecordBuffer::new(3);
        buf.i8(-1);
        buf.i16(-2);
        assert_eq!(buf.data()[0], 0xff);
        assert_eq!(NativeEndian::read_i16(&buf.data()[1..]), -2);
    }
}
