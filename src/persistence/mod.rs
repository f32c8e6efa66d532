pub mod snapshot;

pub use snapshot::{
    list_snapshots, load_latest_valid_snapshot, load_snapshot, prune_snapshots, save_snapshot,
    AnimationSnapshot, BuildSnapshot, CellSnapshot, SnapshotError, SnapshotMetadata,
};
