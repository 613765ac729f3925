// Registry benchmarks for credreg.
//
// Covers credential issuance through the in-memory and sled-backed ledgers,
// authorized reads, and batch verification at various sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use credreg_contracts::identity_registry::NewCredential;
use credreg_contracts::ledger::Ledger;
use credreg_protocol::identity::{AccountId, RequestContext, Role};
use credreg_protocol::storage::{MemoryStore, RegistryDB, RegistryStore};

const NOW: u64 = 1_717_000_000;

fn acct(n: u32) -> AccountId {
    let mut bytes = [0u8; 20];
    bytes[16..].copy_from_slice(&n.to_be_bytes());
    AccountId::from_bytes(bytes)
}

fn ctx(caller: AccountId) -> RequestContext {
    RequestContext::new(caller, NOW)
}

fn credential(n: u64) -> NewCredential {
    NewCredential {
        title: format!("Certificate {n}"),
        issuer_name: "Bench University".into(),
        document_hash: format!("QmBench{n:08}"),
        is_public: n % 2 == 0,
        expires_at: 0,
    }
}

/// Sets up a ledger with admin 1 and issuer 2.
fn setup<S: RegistryStore>(store: S) -> Ledger<S> {
    let ledger = Ledger::deploy(store, &ctx(acct(1))).unwrap();
    ledger
        .assign_role(&ctx(acct(1)), acct(2), Role::Issuer)
        .unwrap();
    ledger
}

fn bench_issue_memory(c: &mut Criterion) {
    let ledger = setup(MemoryStore::new());
    let mut n = 0u64;

    c.bench_function("ledger/issue_memory", |b| {
        b.iter(|| {
            n += 1;
            ledger
                .issue_credential(&ctx(acct(2)), acct(3), credential(n))
                .unwrap()
        });
    });
}

fn bench_issue_sled(c: &mut Criterion) {
    let ledger = setup(RegistryDB::open_temporary().unwrap());
    let mut n = 0u64;

    c.bench_function("ledger/issue_sled", |b| {
        b.iter(|| {
            n += 1;
            ledger
                .issue_credential(&ctx(acct(2)), acct(3), credential(n))
                .unwrap()
        });
    });
}

fn bench_get_credential(c: &mut Criterion) {
    let ledger = setup(MemoryStore::new());
    for n in 0..1_000 {
        ledger
            .issue_credential(&ctx(acct(2)), acct(3), credential(n))
            .unwrap();
    }

    c.bench_function("ledger/get_credential", |b| {
        b.iter(|| ledger.get_credential(&ctx(acct(1)), &acct(3), 500).unwrap());
    });
}

fn bench_verify_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/verify_batch");
    let ledger = setup(MemoryStore::new());
    for subject in 0..256u32 {
        ledger
            .issue_credential(&ctx(acct(2)), acct(1_000 + subject), credential(0))
            .unwrap();
    }

    for size in [1, 16, 64, 256] {
        let requests: Vec<(AccountId, u64)> =
            (0..size).map(|i| (acct(1_000 + i as u32), 0)).collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &requests, |b, requests| {
            b.iter(|| ledger.verify_batch(&ctx(acct(9)), requests));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_issue_memory,
    bench_issue_sled,
    bench_get_credential,
    bench_verify_batch,
);
criterion_main!(benches);
