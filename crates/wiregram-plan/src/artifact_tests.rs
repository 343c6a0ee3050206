use wiregram_core::{BlockId, Bytes, ByteOrder, Expr, FieldId, ParseType, PlanId, TokenId, Value};

use crate::artifact::{Artifact, ArtifactError};
use crate::manifest::{Manifest, ParserEntry, PortSpec, Protocol};
use crate::module::{FieldInfo, Literal, LiteralValue, Module, Plan};
use crate::step::{BytesAttrs, LoopKind, Step};

/// A module whose steps carry constant expressions, so the round trip
/// covers the value codec, not just empty tables.
fn sample_module() -> Module {
    let mut module = Module::default();
    module.literals.push(Literal {
        value: LiteralValue::Bytes(Bytes::from("\r\n")),
        origin: None,
    });

    let plan = Plan {
        name: "Request".to_string(),
        params: vec![],
        root: BlockId(0),
        blocks: vec![
            vec![
                Step::Loop {
                    kind: LoopKind::Counter(Expr::uint(3)),
                    body: BlockId(1),
                    collect: true,
                },
                Step::AssignField {
                    field: FieldId(0),
                    source: None,
                    convert: Some(Expr::Const(Value::bytes(&[0x00, 0xff][..]))),
                    requires: Some(Expr::boolean(true)),
                },
                Step::MatchLiteral { token: TokenId(0) },
            ],
            vec![Step::MatchType {
                ty: ParseType::UInt {
                    bits: 8,
                    order: ByteOrder::Big,
                },
                bytes: BytesAttrs::default(),
            }],
        ],
        fields: vec![FieldInfo {
            name: "values".to_string(),
            transient: false,
            anonymous: false,
            default: Some(Expr::Const(Value::Vector(vec![]))),
            location: None,
        }],
        hooks: vec![],
        sync_token: None,
    };
    module.plans.push(plan);
    module.entries.insert("Request".to_string(), PlanId(0));
    module
}

fn sample() -> Artifact {
    let manifest = Manifest::new(1_700_000_000, false, true).with_parser(ParserEntry {
        name: "HTTP".to_string(),
        mime_types: vec!["text/http".to_string()],
        ports: vec![PortSpec {
            port: 80,
            protocol: Protocol::Tcp,
        }],
        entry: "Request".to_string(),
    });
    Artifact::new(manifest, sample_module())
}

#[test]
fn round_trip() {
    let artifact = sample();
    let bytes = artifact.to_bytes().unwrap();
    let reopened = Artifact::open(&bytes).unwrap();
    assert_eq!(reopened, artifact);
}

#[test]
fn round_trip_through_file() {
    let artifact = sample();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("http.wgrm");
    std::fs::write(&path, artifact.to_bytes().unwrap()).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(Artifact::open(&bytes).unwrap(), artifact);
}

#[test]
fn bad_magic_rejected() {
    let mut bytes = sample().to_bytes().unwrap();
    bytes[0] = b'X';
    assert!(matches!(
        Artifact::open(&bytes),
        Err(ArtifactError::BadMagic)
    ));
}

#[test]
fn version_mismatch_rejected() {
    let mut bytes = sample().to_bytes().unwrap();
    bytes[4] = 99;
    match Artifact::open(&bytes) {
        Err(ArtifactError::VersionMismatch { found, expected }) => {
            assert_eq!(found, 99);
            assert_eq!(expected, crate::manifest::FORMAT_VERSION);
        }
        other => panic!("expected version mismatch, got {other:?}"),
    }
}

#[test]
fn corrupt_payload_rejected() {
    let mut bytes = sample().to_bytes().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    assert!(matches!(
        Artifact::open(&bytes),
        Err(ArtifactError::ChecksumMismatch)
    ));
}

#[test]
fn truncated_rejected() {
    let bytes = sample().to_bytes().unwrap();
    assert!(matches!(
        Artifact::open(&bytes[..6]),
        Err(ArtifactError::Truncated)
    ));
}

#[test]
fn peek_manifest_reads_header_only() {
    let bytes = sample().to_bytes().unwrap();
    let manifest = Artifact::peek_manifest(&bytes).unwrap();
    assert_eq!(manifest.magic, "WGRM");
    assert_eq!(manifest.parsers.len(), 1);
    assert_eq!(
        manifest.parser_for_mime("text/http").map(|p| p.name.as_str()),
        Some("HTTP")
    );
    assert!(manifest.parser_for_mime("text/plain").is_none());
}
