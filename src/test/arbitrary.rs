use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use qcheck::Arbitrary;

use crate::message::{IntroKey, Nonce, TestPayload};

/// Generates both address families, the same split the teacher uses for its
/// own peer address type, since the IPv4/IPv6 byte-length difference is
/// exactly what this crate's wire layer needs to exercise (base spec §6's
/// `ip_size` field).
fn arbitrary_ip(g: &mut qcheck::Gen) -> IpAddr {
    if bool::arbitrary(g) {
        IpAddr::V4(Ipv4Addr::from(u32::arbitrary(g)))
    } else {
        let octets: [u8; 16] = Arbitrary::arbitrary(g);
        IpAddr::V6(Ipv6Addr::from(octets))
    }
}

impl Arbitrary for TestPayload {
    fn arbitrary(g: &mut qcheck::Gen) -> Self {
        let intro_key: IntroKey = <[u8; 32]>::arbitrary(g);
        let nonce: Nonce = Nonce::arbitrary(g);
        let endpoint_ip = bool::arbitrary(g).then(|| arbitrary_ip(g));
        let port = u16::arbitrary(g);

        Self {
            endpoint_ip,
            port,
            intro_key,
            nonce,
        }
    }
}
