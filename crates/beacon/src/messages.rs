//! Wire messages and their canonical encoding.
//!
//! Three message kinds cross the gossip network each epoch:
//!
//! - [`ProposalMessage`] - a miner's VRF-proved beacon proposal
//! - [`FirstVotingMessage`] - full proposal lists for the first round
//! - [`FollowingVotingMessage`] - compact bit-vector votes for later rounds
//!
//! The encoding is canonical: integers are little-endian, variable-length
//! byte strings and lists carry a `u32` length prefix, and decoding rejects
//! trailing bytes. Voting signatures cover the encoded message body minus
//! the signature field; because the body includes the epoch (and round),
//! otherwise-identical votes from different epochs serialize to distinct
//! bytes and cannot be replayed across epochs.

use thiserror::Error;

use petram_types::{EpochId, NodeId, RoundId, SIGNING_KEY_SIZE, VRF_KEY_SIZE};

/// Gossip topic names for the three beacon message kinds.
pub mod topics {
    /// Beacon proposals.
    pub const PROPOSAL: &str = "beacon-proposal";
    /// First-round votes.
    pub const FIRST_VOTES: &str = "beacon-first-votes";
    /// Following-round votes.
    pub const FOLLOWING_VOTES: &str = "beacon-following-votes";
}

/// Domain prefix of the VRF message a proposal proves.
const VRF_PROPOSAL_DOMAIN: &[u8] = b"BeaconProposal";

/// Builds the canonical VRF input for an epoch's proposals.
///
/// Every miner proves the same `(domain, epoch)` message; the resulting
/// proof is both the proposal's authentication and its value.
pub fn proposal_vrf_message(epoch: EpochId) -> Vec<u8> {
    let mut message = Vec::with_capacity(VRF_PROPOSAL_DOMAIN.len() + 4);
    message.extend_from_slice(VRF_PROPOSAL_DOMAIN);
    message.extend_from_slice(&epoch.get().to_le_bytes());
    message
}

/// Upper bound on any single length-prefixed byte string.
const MAX_BYTE_STRING: usize = 1 << 20;

/// Upper bound on list element counts.
const MAX_LIST_LEN: usize = 1 << 16;

/// Errors produced while decoding a wire message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input ended before the message was complete.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Bytes remained after the message was fully decoded.
    #[error("trailing bytes after message")]
    TrailingBytes,

    /// A length prefix exceeds the allowed bound.
    #[error("declared length {len} exceeds limit {max}")]
    LengthLimit {
        /// Declared length.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
}

/// Canonical encoder: little-endian integers, `u32` length prefixes.
#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn put_fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn put_byte_string(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    fn put_byte_list(&mut self, list: &[Vec<u8>]) {
        self.put_u32(list.len() as u32);
        for item in list {
            self.put_byte_string(item);
        }
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Canonical decoder over a borrowed input slice.
struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.data.len() < n {
            return Err(CodecError::UnexpectedEof);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.fixed::<4>()?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn byte_string(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.u32()? as usize;
        if len > MAX_BYTE_STRING {
            return Err(CodecError::LengthLimit {
                len,
                max: MAX_BYTE_STRING,
            });
        }
        Ok(self.take(len)?.to_vec())
    }

    fn byte_list(&mut self) -> Result<Vec<Vec<u8>>, CodecError> {
        let count = self.u32()? as usize;
        if count > MAX_LIST_LEN {
            return Err(CodecError::LengthLimit {
                len: count,
                max: MAX_LIST_LEN,
            });
        }
        let mut list = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            list.push(self.byte_string()?);
        }
        Ok(list)
    }

    fn finish(self) -> Result<(), CodecError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes)
        }
    }
}

/// A miner's beacon proposal for an epoch.
///
/// The message carries no separate signature: the VRF proof authenticates
/// it, since only the holder of the VRF secret key can produce a proof
/// over the canonical epoch message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalMessage {
    /// The proposing miner.
    pub node_id: NodeId,
    /// Epoch the proposal targets.
    pub epoch: EpochId,
    /// VRF proof over [`proposal_vrf_message`]; its first
    /// [`petram_types::BEACON_SIZE`] bytes are the proposal value.
    pub vrf_signature: Vec<u8>,
}

impl ProposalMessage {
    /// Encodes the message to its canonical wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::default();
        enc.put_fixed(&self.node_id.signing_key);
        enc.put_fixed(&self.node_id.vrf_key);
        enc.put_u32(self.epoch.get());
        enc.put_byte_string(&self.vrf_signature);
        enc.finish()
    }

    /// Decodes a message from wire bytes.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(data);
        let signing_key: [u8; SIGNING_KEY_SIZE] = dec.fixed()?;
        let vrf_key: [u8; VRF_KEY_SIZE] = dec.fixed()?;
        let epoch = EpochId::new(dec.u32()?);
        let vrf_signature = dec.byte_string()?;
        dec.finish()?;
        Ok(Self {
            node_id: NodeId::new(signing_key, vrf_key),
            epoch,
            vrf_signature,
        })
    }
}

/// A first-round vote: the full proposal lists the voter observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstVotingMessage {
    /// Epoch being voted on.
    pub epoch: EpochId,
    /// Proposals the voter saw arrive in time.
    pub valid_proposals: Vec<Vec<u8>>,
    /// Proposals the voter saw arrive late but before the grace cutoff.
    pub potentially_valid_proposals: Vec<Vec<u8>>,
    /// Recoverable signature over [`Self::signed_body`].
    pub signature: Vec<u8>,
}

impl FirstVotingMessage {
    /// The canonical bytes the signature covers: everything but the
    /// signature itself.
    pub fn signed_body(&self) -> Vec<u8> {
        let mut enc = Encoder::default();
        enc.put_u32(self.epoch.get());
        enc.put_byte_list(&self.valid_proposals);
        enc.put_byte_list(&self.potentially_valid_proposals);
        enc.finish()
    }

    /// Encodes the message to its canonical wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::default();
        enc.put_fixed(&self.signed_body());
        enc.put_byte_string(&self.signature);
        enc.finish()
    }

    /// Decodes a message from wire bytes.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(data);
        let epoch = EpochId::new(dec.u32()?);
        let valid_proposals = dec.byte_list()?;
        let potentially_valid_proposals = dec.byte_list()?;
        let signature = dec.byte_string()?;
        dec.finish()?;
        Ok(Self {
            epoch,
            valid_proposals,
            potentially_valid_proposals,
            signature,
        })
    }
}

/// A following-round vote: a bit vector over the voter's own first-round
/// ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowingVotingMessage {
    /// Epoch being voted on.
    pub epoch: EpochId,
    /// The voting round this vote belongs to.
    pub round: RoundId,
    /// Bit `j` (LSB of byte 0 first) is the vote on entry `j` of the
    /// voter's first-round ballot: set = for, clear = against.
    pub votes_bit_vector: Vec<u8>,
    /// Recoverable signature over [`Self::signed_body`].
    pub signature: Vec<u8>,
}

impl FollowingVotingMessage {
    /// The canonical bytes the signature covers: everything but the
    /// signature itself.
    pub fn signed_body(&self) -> Vec<u8> {
        let mut enc = Encoder::default();
        enc.put_u32(self.epoch.get());
        enc.put_u32(self.round);
        enc.put_byte_string(&self.votes_bit_vector);
        enc.finish()
    }

    /// Encodes the message to its canonical wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::default();
        enc.put_fixed(&self.signed_body());
        enc.put_byte_string(&self.signature);
        enc.finish()
    }

    /// Decodes a message from wire bytes.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(data);
        let epoch = EpochId::new(dec.u32()?);
        let round = dec.u32()?;
        let votes_bit_vector = dec.byte_string()?;
        let signature = dec.byte_string()?;
        dec.finish()?;
        Ok(Self {
            epoch,
            round,
            votes_bit_vector,
            signature,
        })
    }
}
