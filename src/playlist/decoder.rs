// Flat container records -> folder tree
// FolderStart opens a folder under the cursor, FolderEnd walks back up via the parent link

use thiserror::Error;
use tracing::trace;

use super::tree::{Body, NodeId, PlaylistNode, PlaylistTree};
use crate::provider::FlatRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("folder end at record {record} has no matching folder start")]
    UnmatchedFolderEnd { record: usize },
    #[error("{open} folder(s) still open after the last record")]
    UnclosedFolders { open: usize },
}

/// Attaches `records` below the tree's root and returns the playlist nodes in
/// record order. On error the tree is left partially built; the caller resets
/// it.
pub(crate) fn decode(
    tree: &mut PlaylistTree,
    records: &[FlatRecord],
) -> Result<Vec<NodeId>, HierarchyError> {
    let root = tree.root();
    let mut cursor = root;
    let mut playlists = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match *record {
            FlatRecord::Entry(handle) => {
                let node = tree.attach(cursor, Body::Playlist(PlaylistNode::pending(Some(handle))));
                playlists.push(node);
            }
            FlatRecord::FolderStart => {
                cursor = tree.attach(cursor, Body::Folder { record: index });
            }
            FlatRecord::FolderEnd => {
                if cursor == root {
                    return Err(HierarchyError::UnmatchedFolderEnd { record: index });
                }
                cursor = tree
                    .parent(cursor)
                    .ok_or(HierarchyError::UnmatchedFolderEnd { record: index })?;
            }
            FlatRecord::Placeholder => trace!(record = index, "skipping placeholder record"),
        }
    }

    if cursor != root {
        let mut open = 0;
        let mut walk = Some(cursor);
        while let Some(node) = walk.filter(|n| *n != root) {
            open += 1;
            walk = tree.parent(node);
        }
        return Err(HierarchyError::UnclosedFolders { open });
    }
    Ok(playlists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::NodeKind;
    use crate::provider::{HandleId, PlaylistHandle};
    use crate::testing::{sample_fixture, simulated_context};

    fn entry(raw: u64) -> FlatRecord {
        FlatRecord::Entry(PlaylistHandle::from_id(HandleId::new(raw)))
    }

    fn empty_tree() -> PlaylistTree {
        let (ctx, _probe) = simulated_context(sample_fixture());
        PlaylistTree::new_container(&ctx)
    }

    #[test]
    fn nests_folders_and_playlists() {
        use crate::provider::FlatRecord::{FolderEnd as End, FolderStart as Start};
        let mut tree = empty_tree();
        let records = [entry(1), Start, entry(2), Start, End, End, entry(3)];

        let playlists = decode(&mut tree, &records).unwrap();
        assert_eq!(playlists.len(), 3);

        let root = tree.root();
        let top: Vec<_> = tree.children(root).iter().map(|c| tree.kind(*c)).collect();
        assert_eq!(
            top,
            [Some(NodeKind::Playlist), Some(NodeKind::Folder), Some(NodeKind::Playlist)]
        );

        let folder = tree.child(root, 1).unwrap();
        assert_eq!(tree.num_children(folder), 2);
        let nested = tree.child(folder, 0).unwrap();
        assert_eq!(
            tree.playlist_handle(nested),
            Some(PlaylistHandle::from_id(HandleId::new(2)))
        );
        let inner = tree.child(folder, 1).unwrap();
        assert_eq!(tree.kind(inner), Some(NodeKind::Folder));
        assert!(!tree.has_children(inner));
        assert_eq!(tree.parent(inner), Some(folder));
        assert_eq!(tree.parent(folder), Some(root));
    }

    #[test]
    fn placeholders_are_skipped() {
        let mut tree = empty_tree();
        let records = [FlatRecord::Placeholder, entry(7), FlatRecord::Placeholder];
        let playlists = decode(&mut tree, &records).unwrap();
        assert_eq!(playlists.len(), 1);
        assert_eq!(tree.flatten(), vec![entry(7)]);
    }

    #[test]
    fn unmatched_end_reports_its_record() {
        let mut tree = empty_tree();
        let records = [entry(1), FlatRecord::FolderEnd, entry(2)];
        assert_eq!(
            decode(&mut tree, &records),
            Err(HierarchyError::UnmatchedFolderEnd { record: 1 })
        );
    }

    #[test]
    fn open_folders_at_end_are_an_error() {
        let mut tree = empty_tree();
        let records = [
            FlatRecord::FolderStart,
            FlatRecord::FolderStart,
            entry(1),
            FlatRecord::FolderEnd,
        ];
        assert_eq!(
            decode(&mut tree, &records),
            Err(HierarchyError::UnclosedFolders { open: 1 })
        );
    }

    #[test]
    fn empty_input_gives_bare_root() {
        let mut tree = empty_tree();
        assert!(decode(&mut tree, &[]).unwrap().is_empty());
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn flatten_reproduces_balanced_input() {
        use crate::provider::FlatRecord::{FolderEnd as End, FolderStart as Start};
        let cases: [&[FlatRecord]; 4] = [
            &[entry(1), entry(2), entry(3)],
            &[Start, Start, Start, entry(1), End, End, End],
            &[Start, End, Start, entry(4), End, entry(5)],
            &[entry(1), Start, entry(2), Start, entry(3), End, entry(6), End, Start, End],
        ];
        for records in cases {
            let mut tree = empty_tree();
            decode(&mut tree, records).unwrap();
            assert_eq!(tree.flatten(), records.to_vec());
        }
    }
}
