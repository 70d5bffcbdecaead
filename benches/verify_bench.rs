//! Signature verification and pipeline benchmarks for rfgate

use criterion::{criterion_group, criterion_main, Criterion};
use p256::ecdsa::signature::Signer;
use rand_core::OsRng;
use rfgate::auth::{AuthorizedKey, KeyFormat, KeyMaterial};
use rfgate::{verify_signature, CommandEnvelope, GuardPolicy, ReplayGuard};
use std::hint::black_box;

fn p256_fixture() -> (AuthorizedKey, Vec<u8>, Vec<u8>) {
    let signing = p256::ecdsa::SigningKey::random(&mut OsRng);
    let key = AuthorizedKey {
        callsign: "LA1ABC".to_string(),
        material: KeyMaterial::P256(*signing.verifying_key()),
        format: KeyFormat::Pem,
    };
    let payload =
        br#"{"operator":"LA1ABC","command":"SET_SQUELCH -24","timestamp":1700000000.5}"#.to_vec();
    let sig: p256::ecdsa::Signature = signing.sign(&payload);
    (key, payload, sig.to_der().as_bytes().to_vec())
}

fn benchmark_verification(c: &mut Criterion) {
    let (key, payload, signature) = p256_fixture();

    c.bench_function("verify_p256_der", |b| {
        b.iter(|| {
            let verdict = verify_signature(&key, black_box(&payload), &signature);
            black_box(verdict)
        })
    });
}

fn benchmark_envelope_decode(c: &mut Criterion) {
    let (_, payload, _) = p256_fixture();

    c.bench_function("decode_json_payload", |b| {
        b.iter(|| {
            let envelope = CommandEnvelope::decode(black_box(&payload)).unwrap();
            black_box(envelope)
        })
    });
}

fn benchmark_guard_check(c: &mut Criterion) {
    c.bench_function("replay_guard_check", |b| {
        // Budget high enough that the steady 1 Hz benchmark clock never
        // trips the rate check
        let mut guard = ReplayGuard::new(GuardPolicy {
            max_commands_per_minute: 10_000,
            ..GuardPolicy::default()
        });
        let mut counter = 0u64;

        b.iter(|| {
            counter += 1;
            let raw = format!("{}:LA1ABC:SET_POWER {}", 1_700_000_000 + counter, counter);
            let envelope = CommandEnvelope::parse(
                "LA1ABC",
                &format!("SET_POWER {}", counter),
                (1_700_000_000 + counter) as f64,
                raw.into_bytes(),
            )
            .unwrap();
            let result = guard.check_at(&envelope, (1_700_000_000 + counter) as f64);
            black_box(result)
        })
    });
}

criterion_group!(
    benches,
    benchmark_verification,
    benchmark_envelope_decode,
    benchmark_guard_check
);
criterion_main!(benches);
