//! DER codecs for RFC 3161 requests, responses and tokens, and for the
//! RFC 4998 `ArchiveTimeStamp` record.
//!
//! Only the fields this system consumes are modelled. Structures with
//! optional context-tagged members are walked element by element.

use chrono::{DateTime, NaiveDateTime, Utc};
use der::asn1::{Any, BitString, ObjectIdentifier, OctetString};
use der::{Decode, DecodeOwned, Encode, Reader, Sequence, SliceReader, Tag, TagNumber, Tagged};
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{Error, Result};
use crate::messages::{
    ArchiveTimestamp, MessageImprint, PartialHashSet, ReducedHashTree, TimestampRequest,
    TimestampResponse, TimestampToken, TokenInfo,
};
use crate::primitives::{HashAlgorithm, HashValue};

/// id-signedData
pub const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
/// id-ct-TSTInfo
pub const OID_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");

const TSP_VERSION: u8 = 1;
const SIGNED_DATA_VERSION: u8 = 3;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct MessageImprintAsn1 {
    hash_algorithm: AlgorithmIdentifierOwned,
    hashed_message: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct TimeStampReq {
    version: u8,
    message_imprint: MessageImprintAsn1,
    #[asn1(optional = "true")]
    req_policy: Option<ObjectIdentifier>,
    #[asn1(optional = "true")]
    nonce: Option<u64>,
    #[asn1(default = "Default::default")]
    cert_req: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct PkiStatusInfo {
    status: u32,
    #[asn1(optional = "true")]
    status_string: Option<Vec<String>>,
    #[asn1(optional = "true")]
    fail_info: Option<BitString>,
}

fn context_tag(number: TagNumber) -> Tag {
    Tag::ContextSpecific {
        constructed: true,
        number,
    }
}

/// Split a constructed value into its elements
fn elements(any: &Any) -> Result<Vec<Any>> {
    let mut reader = SliceReader::new(any.value())?;
    let mut out = Vec::new();
    while !reader.is_finished() {
        out.push(Any::decode(&mut reader)?);
    }
    Ok(out)
}

fn decode_any<T: DecodeOwned>(any: &Any) -> Result<T> {
    Ok(T::from_der(&any.to_der()?)?)
}

fn encode_any<T: Encode>(value: &T) -> Result<Any> {
    Ok(Any::from_der(&value.to_der()?)?)
}

fn constructed(tag: Tag, parts: &[Any]) -> Result<Any> {
    let mut value = Vec::new();
    for part in parts {
        value.extend_from_slice(&part.to_der()?);
    }
    Ok(Any::new(tag, value)?)
}

fn expect_tag(any: &Any, tag: Tag, what: &str) -> Result<()> {
    if any.tag() != tag {
        return Err(Error::MalformedToken(format!(
            "{}: expected {}, found {}",
            what,
            tag,
            any.tag()
        )));
    }
    Ok(())
}

/// Minimal big-endian two's complement encoding of a non-negative integer
pub fn integer_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    let mut out = bytes[first..].to_vec();
    if out[0] & 0x80 != 0 {
        out.insert(0, 0);
    }
    out
}

fn algorithm_identifier(oid: ObjectIdentifier) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid,
        parameters: None,
    }
}

fn imprint_to_asn1(imprint: &MessageImprint) -> Result<MessageImprintAsn1> {
    Ok(MessageImprintAsn1 {
        hash_algorithm: algorithm_identifier(imprint.algorithm),
        hashed_message: OctetString::new(imprint.digest.as_bytes().to_vec())?,
    })
}

fn imprint_from_asn1(imprint: &MessageImprintAsn1) -> MessageImprint {
    MessageImprint {
        algorithm: imprint.hash_algorithm.oid,
        digest: HashValue::from_slice(imprint.hashed_message.as_bytes()),
    }
}

pub(crate) fn encode_request(request: &TimestampRequest) -> Result<Vec<u8>> {
    let req = TimeStampReq {
        version: TSP_VERSION,
        message_imprint: imprint_to_asn1(&MessageImprint {
            algorithm: request.algorithm.tsp_oid(),
            digest: request.digest.clone(),
        })?,
        req_policy: None,
        nonce: request.nonce,
        cert_req: request.cert_req,
    };
    Ok(req.to_der()?)
}

pub(crate) fn decode_request(der: &[u8]) -> Result<TimestampRequest> {
    let req = TimeStampReq::from_der(der)?;
    let imprint = imprint_from_asn1(&req.message_imprint);
    Ok(TimestampRequest {
        algorithm: HashAlgorithm::from_oid(&imprint.algorithm)?,
        digest: imprint.digest,
        nonce: req.nonce,
        cert_req: req.cert_req,
    })
}

pub(crate) fn encode_response(response: &TimestampResponse) -> Result<Vec<u8>> {
    let status = PkiStatusInfo {
        status: response.status,
        status_string: if response.status_text.is_empty() {
            None
        } else {
            Some(response.status_text.clone())
        },
        fail_info: None,
    };

    let mut parts = vec![encode_any(&status)?];
    if let Some(token) = &response.token {
        parts.push(Any::from_der(token.as_der())?);
    }
    Ok(constructed(Tag::Sequence, &parts)?.to_der()?)
}

pub(crate) fn decode_response(der: &[u8]) -> Result<TimestampResponse> {
    let outer = Any::from_der(der)?;
    expect_tag(&outer, Tag::Sequence, "TimeStampResp")?;
    let parts = elements(&outer)?;

    let status_any = parts
        .first()
        .ok_or_else(|| Error::MalformedToken("TimeStampResp without status".to_string()))?;
    let status: PkiStatusInfo = decode_any(status_any)?;

    let token = match parts.get(1) {
        Some(token) => {
            expect_tag(token, Tag::Sequence, "TimeStampToken")?;
            Some(TimestampToken::from_der(token.to_der()?))
        }
        None => None,
    };

    Ok(TimestampResponse {
        status: status.status,
        status_text: status.status_string.unwrap_or_default(),
        token,
    })
}

fn parse_gen_time(any: &Any) -> Result<DateTime<Utc>> {
    expect_tag(any, Tag::GeneralizedTime, "genTime")?;
    let text = std::str::from_utf8(any.value())
        .map_err(|e| Error::MalformedToken(format!("genTime: {}", e)))?;
    let body = text
        .strip_suffix('Z')
        .ok_or_else(|| Error::MalformedToken(format!("genTime not in UTC: {}", text)))?;
    // TSAs commonly include fractional seconds, which strict DER time types reject
    let naive = NaiveDateTime::parse_from_str(body, "%Y%m%d%H%M%S%.f")
        .map_err(|e| Error::MalformedToken(format!("genTime {}: {}", text, e)))?;
    Ok(naive.and_utc())
}

fn encode_gen_time(time: &DateTime<Utc>) -> Result<Any> {
    let text = time.format("%Y%m%d%H%M%SZ").to_string();
    Ok(Any::new(Tag::GeneralizedTime, text.into_bytes())?)
}

/// Extract `TSTInfo` from a `ContentInfo` carrying `SignedData`
pub(crate) fn parse_token(der: &[u8]) -> Result<TokenInfo> {
    let content_info = Any::from_der(der)?;
    expect_tag(&content_info, Tag::Sequence, "ContentInfo")?;
    let ci = elements(&content_info)?;
    if ci.len() != 2 {
        return Err(Error::MalformedToken("ContentInfo must have two fields".to_string()));
    }

    let content_type: ObjectIdentifier = decode_any(&ci[0])?;
    if content_type != OID_SIGNED_DATA {
        return Err(Error::MalformedToken(format!(
            "content type {} is not signedData",
            content_type
        )));
    }
    expect_tag(&ci[1], context_tag(TagNumber::N0), "ContentInfo.content")?;
    let signed_data = Any::from_der(ci[1].value())?;
    expect_tag(&signed_data, Tag::Sequence, "SignedData")?;

    let sd = elements(&signed_data)?;
    let encap = sd
        .get(2)
        .ok_or_else(|| Error::MalformedToken("SignedData without encapContentInfo".to_string()))?;
    expect_tag(encap, Tag::Sequence, "EncapsulatedContentInfo")?;

    let eci = elements(encap)?;
    let econtent_type: ObjectIdentifier = decode_any(
        eci.first()
            .ok_or_else(|| Error::MalformedToken("empty EncapsulatedContentInfo".to_string()))?,
    )?;
    if econtent_type != OID_TST_INFO {
        return Err(Error::MalformedToken(format!(
            "encapsulated content {} is not TSTInfo",
            econtent_type
        )));
    }
    let econtent = eci
        .get(1)
        .ok_or_else(|| Error::MalformedToken("TSTInfo content missing".to_string()))?;
    expect_tag(econtent, context_tag(TagNumber::N0), "eContent")?;
    let octets = OctetString::from_der(econtent.value())?;

    parse_tst_info(octets.as_bytes())
}

fn parse_tst_info(der: &[u8]) -> Result<TokenInfo> {
    let tst = Any::from_der(der)?;
    expect_tag(&tst, Tag::Sequence, "TSTInfo")?;
    let fields = elements(&tst)?;
    if fields.len() < 5 {
        return Err(Error::MalformedToken(format!(
            "TSTInfo has {} fields, expected at least 5",
            fields.len()
        )));
    }

    let version: u8 = decode_any(&fields[0])?;
    if version != TSP_VERSION {
        return Err(Error::MalformedToken(format!("TSTInfo version {}", version)));
    }
    let policy: ObjectIdentifier = decode_any(&fields[1])?;
    let imprint: MessageImprintAsn1 = decode_any(&fields[2])?;
    expect_tag(&fields[3], Tag::Integer, "serialNumber")?;
    let serial_number = fields[3].value().to_vec();
    let gen_time = parse_gen_time(&fields[4])?;

    // accuracy and ordering may precede the nonce; it is the only INTEGER left
    let nonce = fields[5..]
        .iter()
        .find(|f| f.tag() == Tag::Integer)
        .map(|f| decode_any::<u64>(f))
        .transpose()
        .map_err(|e| Error::MalformedToken(format!("nonce: {}", e)))?;

    Ok(TokenInfo {
        policy,
        message_imprint: imprint_from_asn1(&imprint),
        serial_number,
        gen_time,
        nonce,
    })
}

/// Wrap `info` in a structurally valid token with no signer infos.
///
/// Such tokens carry no signature and are only meaningful to tests and
/// offline tooling.
pub fn encode_unsigned_token(info: &TokenInfo) -> Result<TimestampToken> {
    let mut tst_fields = vec![
        encode_any(&TSP_VERSION)?,
        encode_any(&info.policy)?,
        encode_any(&imprint_to_asn1(&info.message_imprint)?)?,
        Any::new(Tag::Integer, info.serial_number.clone())?,
        encode_gen_time(&info.gen_time)?,
    ];
    if let Some(nonce) = info.nonce {
        tst_fields.push(encode_any(&nonce)?);
    }
    let tst_info = constructed(Tag::Sequence, &tst_fields)?;

    let econtent = OctetString::new(tst_info.to_der()?)?;
    let encap = constructed(
        Tag::Sequence,
        &[
            encode_any(&OID_TST_INFO)?,
            Any::new(context_tag(TagNumber::N0), econtent.to_der()?)?,
        ],
    )?;

    let digest_algorithms = constructed(
        Tag::Set,
        &[encode_any(&algorithm_identifier(info.message_imprint.algorithm))?],
    )?;
    let signed_data = constructed(
        Tag::Sequence,
        &[
            encode_any(&SIGNED_DATA_VERSION)?,
            digest_algorithms,
            encap,
            constructed(Tag::Set, &[])?,
        ],
    )?;

    let content_info = constructed(
        Tag::Sequence,
        &[
            encode_any(&OID_SIGNED_DATA)?,
            Any::new(context_tag(TagNumber::N0), signed_data.to_der()?)?,
        ],
    )?;

    Ok(TimestampToken::from_der(content_info.to_der()?))
}

// ArchiveTimeStamp uses IMPLICIT TAGS: [0] and [2] replace the SEQUENCE tag
// of the value they carry.

pub(crate) fn encode_archive_timestamp(record: &ArchiveTimestamp) -> Result<Vec<u8>> {
    let algorithm = encode_any(&algorithm_identifier(record.digest_algorithm.digest_oid()))?;
    let algorithm = Any::new(context_tag(TagNumber::N0), algorithm.value().to_vec())?;

    let mut partial_trees = Vec::with_capacity(record.reduced_hash_tree.len());
    for level in record.reduced_hash_tree.levels() {
        let mut octets = Vec::with_capacity(level.len());
        for hash in level.hashes() {
            octets.push(encode_any(&OctetString::new(hash.as_bytes().to_vec())?)?);
        }
        partial_trees.push(constructed(Tag::Sequence, &octets)?);
    }
    let reduced = constructed(context_tag(TagNumber::N2), &partial_trees)?;

    let token = Any::from_der(record.timestamp_token.as_der())?;

    Ok(constructed(Tag::Sequence, &[algorithm, reduced, token])?.to_der()?)
}

pub(crate) fn decode_archive_timestamp(der: &[u8]) -> Result<ArchiveTimestamp> {
    let outer = Any::from_der(der)?;
    if outer.tag() != Tag::Sequence {
        return Err(Error::MalformedRecord(format!(
            "expected SEQUENCE, found {}",
            outer.tag()
        )));
    }

    let mut digest_algorithm = None;
    let mut levels = Vec::new();
    let mut token = None;
    // Fields must appear in declaration order, each at most once
    let mut last_position = None;

    for field in elements(&outer)? {
        let position = match field.tag() {
            tag if tag == context_tag(TagNumber::N0) => 0,
            tag if tag == context_tag(TagNumber::N1) => 1,
            tag if tag == context_tag(TagNumber::N2) => 2,
            Tag::Sequence => 3,
            other => {
                return Err(Error::MalformedRecord(format!("unexpected field {}", other)));
            }
        };
        if last_position.is_some_and(|last| position <= last) {
            return Err(Error::MalformedRecord(format!(
                "field {} is repeated or out of order",
                field.tag()
            )));
        }
        last_position = Some(position);

        match position {
            0 => {
                let inner = elements(&field)?;
                let oid: ObjectIdentifier = decode_any(inner.first().ok_or_else(|| {
                    Error::MalformedRecord("empty digestAlgorithm".to_string())
                })?)?;
                digest_algorithm = Some(HashAlgorithm::from_oid(&oid)?);
            }
            // attributes are not interpreted
            1 => {}
            2 => {
                for partial in elements(&field)? {
                    if partial.tag() != Tag::Sequence {
                        return Err(Error::MalformedRecord(
                            "PartialHashtree must be a SEQUENCE".to_string(),
                        ));
                    }
                    let mut hashes = Vec::new();
                    for octets in elements(&partial)? {
                        let value: OctetString = decode_any(&octets)?;
                        hashes.push(HashValue::from_slice(value.as_bytes()));
                    }
                    levels.push(PartialHashSet::new(hashes));
                }
            }
            _ => {
                token = Some(TimestampToken::from_der(field.to_der()?));
            }
        }
    }

    let timestamp_token =
        token.ok_or_else(|| Error::MalformedRecord("missing timeStamp".to_string()))?;

    // Without an explicit algorithm the tree uses the timestamp's algorithm
    let digest_algorithm = match digest_algorithm {
        Some(alg) => alg,
        None => timestamp_token.info()?.imprint_algorithm()?,
    };

    Ok(ArchiveTimestamp {
        digest_algorithm,
        reduced_hash_tree: ReducedHashTree::new(levels),
        timestamp_token,
    })
}
