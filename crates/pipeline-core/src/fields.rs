//! Packet field model shared by the classification engine and scripts.
//!
//! The classification engine hands the pipeline a [`ParsedKey`]. Scripts never
//! see that structure; they read a flat, fixed set of named fields produced by
//! [`PacketFields::from_key`]. The order of [`Field::ALL`] is the order of the
//! `field_names` list exposed to scripts and must never change at runtime.

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

// ── Parsed key (classification engine output) ────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetKey {
    pub src: [u8; 6],
    pub dst: [u8; 6],
    /// Ethertype of the innermost header (after any VLAN tag).
    pub ethertype: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanKey {
    pub vid: u16,
    pub pcp: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Key {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub proto: u8,
    /// Full TOS byte: DSCP in the upper six bits, ECN in the lower two.
    pub tos: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Key {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub proto: u8,
    pub tclass: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportKey {
    pub src: u16,
    pub dst: u16,
    /// TCP flags. Zero for UDP/SCTP.
    #[serde(default)]
    pub tcp_flags: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpKey {
    pub op: u16,
    pub sip: Ipv4Addr,
    pub tip: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmpKey {
    pub icmp_type: u8,
    pub code: u8,
}

/// Headers the classification engine extracted from one packet.
/// Absent layers are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedKey {
    pub in_port: u32,
    #[serde(default)]
    pub pkt_mark: u32,
    #[serde(default)]
    pub tunnel_id: Option<u64>,
    #[serde(default)]
    pub ethernet: EthernetKey,
    #[serde(default)]
    pub vlan: Option<VlanKey>,
    #[serde(default)]
    pub ipv4: Option<Ipv4Key>,
    #[serde(default)]
    pub ipv6: Option<Ipv6Key>,
    #[serde(default)]
    pub transport: Option<TransportKey>,
    #[serde(default)]
    pub arp: Option<ArpKey>,
    #[serde(default)]
    pub icmp: Option<IcmpKey>,
}

// ── Field names ───────────────────────────────────────────────────────────────

/// OpenFlow "VLAN present" bit carried in `vlan_vid`.
pub const VLAN_CFI_BIT: u64 = 0x1000;

macro_rules! fields {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// A field scripts can read from the packet context.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(usize)]
        pub enum Field {
            $($variant),+
        }

        impl Field {
            /// Every field, in the order exposed to scripts.
            pub const ALL: &'static [Field] = &[$(Field::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(Field::$variant => $name),+
                }
            }

            pub fn from_name(name: &str) -> Option<Field> {
                match name {
                    $($name => Some(Field::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

fields! {
    InPort => "in_port",
    PktMark => "pkt_mark",
    TunnelId => "tunnel_id",
    EthSrc => "eth_src",
    EthDst => "eth_dst",
    EthType => "eth_type",
    VlanVid => "vlan_vid",
    VlanPcp => "vlan_pcp",
    IpProto => "ip_proto",
    IpDscp => "ip_dscp",
    IpEcn => "ip_ecn",
    Ipv4Src => "ipv4_src",
    Ipv4Dst => "ipv4_dst",
    Ipv6Src => "ipv6_src",
    Ipv6Dst => "ipv6_dst",
    TpSrc => "tp_src",
    TpDst => "tp_dst",
    TcpFlags => "tcp_flags",
    ArpOp => "arp_op",
    ArpSpa => "arp_spa",
    ArpTpa => "arp_tpa",
    IcmpType => "icmp_type",
    IcmpCode => "icmp_code",
}

pub const FIELD_COUNT: usize = Field::ALL.len();

/// Field names in exposure order.
pub fn field_names() -> impl Iterator<Item = &'static str> {
    Field::ALL.iter().map(|f| f.name())
}

// ── Field values ──────────────────────────────────────────────────────────────

/// Value of one field. Everything but IPv6 addresses fits an integer.
///
/// Scripts see integers as Lua's signed 64-bit type, so an `Int` reaches them
/// as its two's-complement bit pattern: a `tunnel_id` above `i64::MAX` reads
/// as a negative number. Comparisons against values built the same way
/// (`string.format("%x", v)`, `v & mask`) are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Int(u64),
    Ipv6([u8; 16]),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Int(0)
    }
}

/// Flat, field-indexed view of a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketFields {
    values: [FieldValue; FIELD_COUNT],
}

impl Default for PacketFields {
    fn default() -> Self {
        let mut values = [FieldValue::default(); FIELD_COUNT];
        values[Field::Ipv6Src as usize] = FieldValue::Ipv6([0; 16]);
        values[Field::Ipv6Dst as usize] = FieldValue::Ipv6([0; 16]);
        Self { values }
    }
}

pub fn mac_to_u64(mac: &[u8; 6]) -> u64 {
    mac.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

pub fn u64_to_mac(value: u64) -> [u8; 6] {
    let b = value.to_be_bytes();
    [b[2], b[3], b[4], b[5], b[6], b[7]]
}

impl PacketFields {
    /// Translate a parsed key. Every field is written, so nothing from a
    /// previous packet can survive into this one.
    pub fn from_key(key: &ParsedKey) -> Self {
        let mut f = PacketFields::default();
        let int = |v: u64| FieldValue::Int(v);

        f.set(Field::InPort, int(key.in_port as u64));
        f.set(Field::PktMark, int(key.pkt_mark as u64));
        f.set(Field::TunnelId, int(key.tunnel_id.unwrap_or(0)));
        f.set(Field::EthSrc, int(mac_to_u64(&key.ethernet.src)));
        f.set(Field::EthDst, int(mac_to_u64(&key.ethernet.dst)));
        f.set(Field::EthType, int(key.ethernet.ethertype as u64));

        if let Some(vlan) = key.vlan {
            f.set(Field::VlanVid, int((vlan.vid as u64 & 0x0fff) | VLAN_CFI_BIT));
            f.set(Field::VlanPcp, int(vlan.pcp as u64 & 0x7));
        }

        if let Some(ip) = key.ipv4 {
            f.set(Field::IpProto, int(ip.proto as u64));
            f.set(Field::IpDscp, int((ip.tos >> 2) as u64));
            f.set(Field::IpEcn, int((ip.tos & 0x3) as u64));
            f.set(Field::Ipv4Src, int(u32::from(ip.src) as u64));
            f.set(Field::Ipv4Dst, int(u32::from(ip.dst) as u64));
        } else if let Some(ip) = key.ipv6 {
            f.set(Field::IpProto, int(ip.proto as u64));
            f.set(Field::IpDscp, int((ip.tclass >> 2) as u64));
            f.set(Field::IpEcn, int((ip.tclass & 0x3) as u64));
            f.set(Field::Ipv6Src, FieldValue::Ipv6(ip.src.octets()));
            f.set(Field::Ipv6Dst, FieldValue::Ipv6(ip.dst.octets()));
        }

        if let Some(tp) = key.transport {
            f.set(Field::TpSrc, int(tp.src as u64));
            f.set(Field::TpDst, int(tp.dst as u64));
            f.set(Field::TcpFlags, int(tp.tcp_flags as u64));
        }

        if let Some(arp) = key.arp {
            f.set(Field::ArpOp, int(arp.op as u64));
            f.set(Field::ArpSpa, int(u32::from(arp.sip) as u64));
            f.set(Field::ArpTpa, int(u32::from(arp.tip) as u64));
        }

        if let Some(icmp) = key.icmp {
            f.set(Field::IcmpType, int(icmp.icmp_type as u64));
            f.set(Field::IcmpCode, int(icmp.code as u64));
        }

        f
    }

    pub fn get(&self, field: Field) -> FieldValue {
        self.values[field as usize]
    }

    fn set(&mut self, field: Field, value: FieldValue) {
        self.values[field as usize] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_key() -> ParsedKey {
        ParsedKey {
            in_port: 3,
            ethernet: EthernetKey {
                src: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
                dst: [0xff; 6],
                ethertype: 0x0800,
            },
            vlan: Some(VlanKey { vid: 10, pcp: 5 }),
            ipv4: Some(Ipv4Key {
                src: Ipv4Addr::new(10, 0, 0, 1),
                dst: Ipv4Addr::new(192, 168, 1, 2),
                proto: 6,
                tos: 0xb9,
            }),
            transport: Some(TransportKey {
                src: 40000,
                dst: 443,
                tcp_flags: 0x02,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn names_are_unique_and_round_trip() {
        let mut seen = std::collections::HashSet::new();
        for &field in Field::ALL {
            assert!(seen.insert(field.name()), "duplicate {}", field.name());
            assert_eq!(Field::from_name(field.name()), Some(field));
        }
        assert_eq!(seen.len(), FIELD_COUNT);
        assert_eq!(Field::from_name("no_such_field"), None);
    }

    #[test]
    fn exposure_order_is_stable() {
        let names: Vec<_> = field_names().collect();
        assert_eq!(names[0], "in_port");
        assert_eq!(names[FIELD_COUNT - 1], "icmp_code");
        for (i, field) in Field::ALL.iter().enumerate() {
            assert_eq!(*field as usize, i);
        }
    }

    #[test]
    fn translates_tcp_key() {
        let f = PacketFields::from_key(&tcp_key());
        assert_eq!(f.get(Field::InPort), FieldValue::Int(3));
        assert_eq!(f.get(Field::EthSrc), FieldValue::Int(0x0011_2233_4455));
        assert_eq!(f.get(Field::EthDst), FieldValue::Int(0xffff_ffff_ffff));
        assert_eq!(f.get(Field::VlanVid), FieldValue::Int(10 | VLAN_CFI_BIT));
        assert_eq!(f.get(Field::VlanPcp), FieldValue::Int(5));
        assert_eq!(f.get(Field::IpDscp), FieldValue::Int(0xb9 >> 2));
        assert_eq!(f.get(Field::IpEcn), FieldValue::Int(1));
        assert_eq!(f.get(Field::Ipv4Src), FieldValue::Int(0x0a00_0001));
        assert_eq!(f.get(Field::TpDst), FieldValue::Int(443));
        assert_eq!(f.get(Field::TcpFlags), FieldValue::Int(2));
        assert_eq!(f.get(Field::Ipv6Src), FieldValue::Ipv6([0; 16]));
    }

    #[test]
    fn absent_layers_read_as_zero() {
        let f = PacketFields::from_key(&ParsedKey {
            in_port: 1,
            ..Default::default()
        });
        assert_eq!(f.get(Field::VlanVid), FieldValue::Int(0));
        assert_eq!(f.get(Field::Ipv4Dst), FieldValue::Int(0));
        assert_eq!(f.get(Field::ArpOp), FieldValue::Int(0));
    }

    #[test]
    fn ipv6_addresses_are_raw_octets() {
        let src: Ipv6Addr = "fe80::1".parse().unwrap();
        let f = PacketFields::from_key(&ParsedKey {
            ipv6: Some(Ipv6Key {
                src,
                dst: Ipv6Addr::UNSPECIFIED,
                proto: 58,
                tclass: 0,
            }),
            ..Default::default()
        });
        assert_eq!(f.get(Field::Ipv6Src), FieldValue::Ipv6(src.octets()));
        assert_eq!(f.get(Field::IpProto), FieldValue::Int(58));
    }

    #[test]
    fn mac_conversion_round_trips() {
        let mac = [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01];
        assert_eq!(u64_to_mac(mac_to_u64(&mac)), mac);
    }

    #[test]
    fn parsed_key_from_sparse_json() {
        let key: ParsedKey = serde_json::from_str(r#"{"in_port": 9}"#).unwrap();
        assert_eq!(key.in_port, 9);
        assert!(key.ipv4.is_none());
    }
}
