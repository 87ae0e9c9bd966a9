use anyhow::Result;

use PageVeil::consts::{OP_DISK, OP_ENCODE, OP_JOURNAL};
use PageVeil::{create_codec, Codec, DbInfo};

const OP_DEC: u32 = OP_JOURNAL | OP_DISK; // 3: decode, journal, disk
const OP_ENC: u32 = OP_DISK | OP_ENCODE; // 6: encode, main db / WAL

fn attach(key: &[u8], page_size: usize) -> Result<Box<dyn Codec>> {
    let info = DbInfo {
        path: "/tmp/roundtrip.db",
        name: "main",
        page_size,
        reserve: 0,
    };
    let mut codec = create_codec(&info, key.to_vec())?;
    let reserve = codec.reserve();
    codec.resize(page_size, reserve);
    Ok(codec)
}

/// Deterministic page fill: every byte depends on the seed and offset.
fn pattern(page_size: usize, seed: u32) -> Vec<u8> {
    (0..page_size)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed * 7 + 13) as u8)
        .collect()
}

/// Decode(Encode(p, n), n) == p for every page size, key size, stream mode
/// and hash the descriptor can select.
#[test]
fn roundtrip_matrix() -> Result<()> {
    let option_sets: &[&str] = &[
        "",
        "192",
        "256",
        "ofb",
        "192,ofb",
        "256,ofb",
        "sha256",
        "192,sha256",
        "256,sha256",
        "ofb,sha256",
        "192,ofb,sha256",
        "256,ofb,sha256",
    ];

    for &page_size in &[512usize, 1024, 4096, 65536] {
        for (si, opts) in option_sets.iter().enumerate() {
            let key = format!("aes:{}:matrix secret {}", opts, page_size);
            let mut codec = attach(key.as_bytes(), page_size)?;

            // Page 1 first: the bootstrap mints the master key into the
            // input page's key slot, so the reference copy is taken after
            // the encode.
            let mut p1 = pattern(page_size, si as u32);
            let ct1 = codec.encode(&mut p1, 1, OP_ENC)?.to_vec();
            let mut back = ct1.clone();
            codec.decode(&mut back, 1, OP_DEC)?;
            assert_eq!(back, p1, "page 1 roundtrip (P={} opts={:?})", page_size, opts);

            for n in [2u32, 3, 5] {
                let mut pn = pattern(page_size, si as u32 + n);
                let before = pn.clone();
                let ct = codec.encode(&mut pn, n, OP_ENC)?.to_vec();
                assert_eq!(pn, before, "encode must not touch pages other than page 1");
                let mut dec = ct.clone();
                codec.decode(&mut dec, n, OP_DEC)?;
                assert_eq!(dec, pn, "page {} roundtrip (P={} opts={:?})", n, page_size, opts);
            }
        }
    }
    Ok(())
}

/// Two encodes of identical input must differ: the IV is drawn fresh every
/// time, and the keystream moves with it.
#[test]
fn encode_freshness() -> Result<()> {
    let page_size = 4096usize;
    let mut codec = attach(b"aes::freshness secret", page_size)?;
    let text_len = page_size - 16 - 16; // tag + IV off the tail
    let iv_slot = text_len..text_len + 16;

    let mut p1 = pattern(page_size, 1);
    codec.encode(&mut p1, 1, OP_ENC)?;

    let mut pn = pattern(page_size, 2);
    let ct_a = codec.encode(&mut pn, 2, OP_ENC)?.to_vec();
    let ct_b = codec.encode(&mut pn, 2, OP_ENC)?.to_vec();

    assert_ne!(&ct_a[iv_slot.clone()], &ct_b[iv_slot], "IVs must differ");
    assert_ne!(&ct_a[..text_len], &ct_b[..text_len], "ciphertext must differ");
    Ok(())
}

/// Scenario: all-zero page through the default configuration.
#[test]
fn zero_page_default_config() -> Result<()> {
    let page_size = 4096usize;
    let mut codec = attach(b"aes::topsecret", page_size)?;

    let mut p1 = vec![0u8; page_size];
    let ct = codec.encode(&mut p1, 1, OP_ENC)?.to_vec();
    // Header bytes ride in the clear and the plaintext there is zero.
    assert_eq!(&ct[16..24], &[0u8; 8]);

    let mut back = ct;
    codec.decode(&mut back, 1, OP_DEC)?;
    assert_eq!(back, p1);
    assert_eq!(&back[16..24], &[0u8; 8]);
    Ok(())
}

/// Scenario: the same plaintext on two different pages shares no aligned
/// 16-byte ciphertext block.
#[test]
fn no_shared_blocks_between_pages() -> Result<()> {
    let page_size = 4096usize;
    let mut codec = attach(b"aes::topsecret", page_size)?;
    let reserve = codec.reserve();

    let plain: Vec<u8> = (0..page_size).map(|i| (i % 256) as u8).collect();

    let mut p1 = plain.clone();
    let ct1 = codec.encode(&mut p1, 1, OP_ENC)?.to_vec();
    let mut p2 = plain.clone();
    let ct2 = codec.encode(&mut p2, 2, OP_ENC)?.to_vec();

    let body = page_size - reserve;
    for (i, (a, b)) in ct1[..body]
        .chunks(16)
        .zip(ct2[..body].chunks(16))
        .enumerate()
    {
        assert_ne!(a, b, "aligned block {} identical across pages", i);
    }
    Ok(())
}

/// Page-1 header bytes [16, 24) are bit-identical in the ciphertext and
/// restored after in-place decryption.
#[test]
fn page1_header_preserved() -> Result<()> {
    let page_size = 1024usize;
    let mut codec = attach(b"aes:sha256:header secret", page_size)?;

    let mut p1 = pattern(page_size, 9);
    let hdr: Vec<u8> = p1[16..24].to_vec();
    let ct = codec.encode(&mut p1, 1, OP_ENC)?.to_vec();
    assert_eq!(&ct[16..24], hdr.as_slice(), "ciphertext must keep the header");

    let mut back = ct;
    codec.decode(&mut back, 1, OP_DEC)?;
    assert_eq!(&back[16..24], hdr.as_slice(), "decode must restore the header");
    assert_eq!(back, p1);
    Ok(())
}

/// The rollback-journal op bit must not change the bytes a codec produces.
#[test]
fn journal_bit_is_transparent() -> Result<()> {
    let page_size = 512usize;
    let mut codec = attach(b"aes::journal secret", page_size)?;

    let mut p1 = pattern(page_size, 3);
    codec.encode(&mut p1, 1, OP_ENC)?;

    let mut pn = pattern(page_size, 4);
    let ct = codec
        .encode(&mut pn, 2, OP_ENC | OP_JOURNAL)? // 7: journal encode
        .to_vec();
    let mut back = ct;
    codec.decode(&mut back, 2, OP_DEC)?;
    assert_eq!(back, pn);
    Ok(())
}
