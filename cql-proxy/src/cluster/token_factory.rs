use bytes::Buf;
use derive_more::Display;
use std::cmp::min;
use std::num::Wrapping;

use cql_protocol::token::Token;

use crate::{Error, Result};

const C1: Wrapping<i64> = Wrapping(0x87c3_7b91_1142_53d5_u64 as i64);
const C2: Wrapping<i64> = Wrapping(0x4cf5_ad43_2745_937f_u64 as i64);

const MURMUR3_PARTITIONER: &str = "Murmur3Partitioner";
const BYTE_ORDERED_PARTITIONER: &str = "ByteOrderedPartitioner";

/// Partitioners with a token implementation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Partitioner {
    #[default]
    Murmur3,
    ByteOrdered,
}

impl Partitioner {
    /// Detects the partitioner from the class name reported in `system.local`.
    pub fn from_class(class_name: &str) -> Result<Self> {
        let name = class_name.rsplit('.').next().unwrap_or(class_name);
        match name {
            MURMUR3_PARTITIONER => Ok(Partitioner::Murmur3),
            BYTE_ORDERED_PARTITIONER => Ok(Partitioner::ByteOrdered),
            _ => Err(Error::UnsupportedPartitioner(class_name.into())),
        }
    }

    /// Computes the token of a routing key.
    pub fn hash(self, routing_key: &[u8]) -> Token {
        match self {
            Partitioner::Murmur3 => generate_murmur3_token(routing_key),
            Partitioner::ByteOrdered => Token::Bytes(routing_key.to_vec()),
        }
    }

    /// Parses a token as stored in system tables.
    pub fn parse_token(self, value: &str) -> Result<Token> {
        match self {
            Partitioner::Murmur3 => Token::parse_murmur3(value),
            Partitioner::ByteOrdered => Token::parse_bytes(value),
        }
    }
}

// based on buggy Cassandra implementation
fn generate_murmur3_token(mut routing_key: &[u8]) -> Token {
    let length = routing_key.len();

    let mut h1: Wrapping<i64> = Wrapping(0);
    let mut h2: Wrapping<i64> = Wrapping(0);

    while routing_key.len() >= 16 {
        let mut k1 = Wrapping(routing_key.get_i64_le());
        let mut k2 = Wrapping(routing_key.get_i64_le());

        k1 *= C1;
        k1 = rotl64(k1, 31);
        k1 *= C2;
        h1 ^= k1;

        h1 = rotl64(h1, 27);
        h1 += h2;
        h1 = h1 * Wrapping(5) + Wrapping(0x52dce729);

        k2 *= C2;
        k2 = rotl64(k2, 33);
        k2 *= C1;
        h2 ^= k2;

        h2 = rotl64(h2, 31);
        h2 += h1;
        h2 = h2 * Wrapping(5) + Wrapping(0x38495ab5);
    }

    let mut k1 = Wrapping(0_i64);
    let mut k2 = Wrapping(0_i64);

    debug_assert!(routing_key.len() < 16);

    if routing_key.len() > 8 {
        for i in (8..routing_key.len()).rev() {
            k2 ^= Wrapping(routing_key[i] as i8 as i64) << ((i - 8) * 8);
        }

        k2 *= C2;
        k2 = rotl64(k2, 33);
        k2 *= C1;
        h2 ^= k2;
    }

    if !routing_key.is_empty() {
        for i in (0..min(8, routing_key.len())).rev() {
            k1 ^= Wrapping(routing_key[i] as i8 as i64) << (i * 8);
        }

        k1 *= C1;
        k1 = rotl64(k1, 31);
        k1 *= C2;
        h1 ^= k1;
    }

    h1 ^= Wrapping(length as i64);
    h2 ^= Wrapping(length as i64);

    h1 += h2;
    h2 += h1;

    h1 = fmix(h1);
    h2 = fmix(h2);

    h1 += h2;

    // the minimum token is reserved for the ring start
    if h1.0 == i64::MIN {
        Token::Murmur3(i64::MAX)
    } else {
        Token::Murmur3(h1.0)
    }
}

#[inline]
fn rotl64(v: Wrapping<i64>, n: u32) -> Wrapping<i64> {
    Wrapping((v.0 << n) | (v.0 as u64 >> (64 - n)) as i64)
}

#[inline]
fn fmix(mut k: Wrapping<i64>) -> Wrapping<i64> {
    k ^= Wrapping((k.0 as u64 >> 33) as i64);
    k *= Wrapping(0xff51afd7ed558ccd_u64 as i64);
    k ^= Wrapping((k.0 as u64 >> 33) as i64);
    k *= Wrapping(0xc4ceb9fe1a85ec53_u64 as i64);
    k ^= Wrapping((k.0 as u64 >> 33) as i64);

    k
}
