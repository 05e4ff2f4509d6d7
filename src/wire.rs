use std::io;
use std::mem;
use std::net::IpAddr;

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};

/// The type we use to represent sizes on the wire (IPv4/IPv6 payload length,
/// bloom filter byte length). One byte is enough: the largest variable-length
/// field in this protocol is a 16-byte IPv6 address.
pub type Size = u8;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("i/o: {0}")]
    Io(#[from] io::Error),
    #[error("invalid ip size: {0}")]
    InvalidIpSize(u8),
    #[error("unknown message kind: {0}")]
    UnknownMessageKind(u8),
    #[error("unexpected bytes")]
    UnexpectedBytes,
}

impl Error {
    /// Whether we've reached the end of file. This is true when we fail to
    /// decode a message because there's not enough data in the stream --
    /// the base spec's "malformed payload" case (§7), handled by dropping
    /// with a warning rather than propagating a fatal error.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Things that can be encoded as binary.
pub trait Encode {
    fn encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error>;
}

/// Things that can be decoded from binary.
pub trait Decode: Sized {
    fn decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error>;
}

/// Encode an object into a byte vector.
pub fn serialize<T: Encode + ?Sized>(data: &T) -> Vec<u8> {
    let mut buffer = Vec::new();
    #[allow(clippy::unwrap_used)]
    let len = data.encode(&mut buffer).unwrap();

    debug_assert_eq!(len, buffer.len());

    buffer
}

/// Decode an object from a byte slice.
pub fn deserialize<T: Decode>(data: &[u8]) -> Result<T, Error> {
    let mut cursor = io::Cursor::new(data);
    let obj = T::decode(&mut cursor)?;

    if cursor.position() as usize != cursor.get_ref().len() {
        return Err(Error::UnexpectedBytes);
    }
    Ok(obj)
}

impl Encode for u8 {
    fn encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        writer.write_u8(*self)?;
        Ok(mem::size_of::<Self>())
    }
}

impl Encode for u16 {
    fn encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        writer.write_u16::<NetworkEndian>(*self)?;
        Ok(mem::size_of::<Self>())
    }
}

impl Encode for u32 {
    fn encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        writer.write_u32::<NetworkEndian>(*self)?;
        Ok(mem::size_of::<Self>())
    }
}

impl Encode for u64 {
    fn encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        writer.write_u64::<NetworkEndian>(*self)?;
        Ok(mem::size_of::<Self>())
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        writer.write_all(self)?;
        Ok(N)
    }
}

impl<T, const N: usize> Encode for &[T; N]
where
    T: Encode,
{
    fn encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        (**self).encode(writer)
    }
}

/// Encodes as a one-byte length prefix (4 or 16, per base spec §6's `ip_size`
/// field) followed by the address's octets, never the IPv4-in-IPv6 mapped
/// form -- role disambiguation in the responder depends on comparing this
/// exact representation against the packet's source endpoint (base spec §9).
impl Encode for IpAddr {
    fn encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            IpAddr::V4(addr) => {
                let mut n = 4u8.encode(writer)?;
                n += addr.octets().encode(writer)?;
                Ok(n)
            }
            IpAddr::V6(addr) => {
                let mut n = 16u8.encode(writer)?;
                n += addr.octets().encode(writer)?;
                Ok(n)
            }
        }
    }
}

impl Decode for u8 {
    fn decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        reader.read_u8().map_err(Error::from)
    }
}

impl Decode for u16 {
    fn decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        reader.read_u16::<NetworkEndian>().map_err(Error::from)
    }
}

impl Decode for u32 {
    fn decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        reader.read_u32::<NetworkEndian>().map_err(Error::from)
    }
}

impl Decode for u64 {
    fn decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        reader.read_u64::<NetworkEndian>().map_err(Error::from)
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let mut ary = [0; N];
        reader.read_exact(&mut ary)?;
        Ok(ary)
    }
}

impl Decode for IpAddr {
    fn decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        match u8::decode(reader)? {
            4 => {
                let octets: [u8; 4] = Decode::decode(reader)?;
                Ok(IpAddr::from(octets))
            }
            16 => {
                let octets: [u8; 16] = Decode::decode(reader)?;
                Ok(IpAddr::from(octets))
            }
            size => Err(Error::InvalidIpSize(size)),
        }
    }
}

/// Encodes the base spec's `ip_size` convention directly: 0 for an absent
/// endpoint (`TestFromAlice`'s payload carries no address, base spec §6),
/// 4 or 16 for a present one.
impl Encode for Option<IpAddr> {
    fn encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        match self {
            None => 0u8.encode(writer),
            Some(addr) => addr.encode(writer),
        }
    }
}

impl Decode for Option<IpAddr> {
    fn decode<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        match u8::decode(reader)? {
            0 => Ok(None),
            4 => {
                let octets: [u8; 4] = Decode::decode(reader)?;
                Ok(Some(IpAddr::from(octets)))
            }
            16 => {
                let octets: [u8; 16] = Decode::decode(reader)?;
                Ok(Some(IpAddr::from(octets)))
            }
            size => Err(Error::InvalidIpSize(size)),
        }
    }
}
