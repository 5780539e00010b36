use catfs::{Directory, File, Hash, MemoryStore, Node, NodeSink};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Build a chain of `depth` nested directories and return the deepest one
fn deep_tree(store: &MemoryStore, depth: usize) -> Directory {
    let mut current = Directory::new_root(store).unwrap();
    store.put_node(&current.clone().into()).unwrap();

    for level in 0..depth {
        let (dir, changes) =
            Directory::new_empty(store, Some(&mut current), &format!("d{}", level)).unwrap();
        changes.persist(store).unwrap();
        store.put_node(&current.into()).unwrap();
        store.put_node(&dir.clone().into()).unwrap();
        current = dir;
    }

    current
}

fn persist(store: &MemoryStore, dir: &Directory, child: &Node, changes: &catfs::Changeset) {
    changes.persist(store).unwrap();
    store.put_node(child).unwrap();
    store.put_node(&dir.clone().into()).unwrap();
}

pub fn add_remove(c: &mut Criterion) {
    let mut g = c.benchmark_group("add_remove");

    for depth in [1usize, 8, 32, 128] {
        let store = MemoryStore::new();
        let mut leaf = deep_tree(&store, depth);
        let mut file: Node = File::new(&store, "payload", 4096, Hash::digest(b"payload"))
            .unwrap()
            .into();

        g.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                let changes = leaf.add(&store, &mut file).unwrap();
                persist(&store, &leaf, &file, &changes);
                let changes = leaf.remove_child(&store, &mut file).unwrap();
                persist(&store, &leaf, &file, &changes);
                black_box(leaf.digest());
            });
        });
    }

    g.finish();
}

pub fn combine(c: &mut Criterion) {
    let a = Hash::digest(b"left");
    let b = Hash::digest(b"right");
    c.bench_function("combine", |bench| {
        bench.iter(|| black_box(black_box(a).combined(&black_box(b))));
    });
}

criterion_group!(benches, add_remove, combine);
criterion_main!(benches);
