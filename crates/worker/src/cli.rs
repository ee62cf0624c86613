//! Command-line surface of the worker: one operation per invocation.

use clap::{Parser, Subcommand, ValueEnum};

use curio_core::types::{DbId, EntityId};
use curio_core::wishlist::AddCollectionMode;

#[derive(Parser, Debug)]
#[command(name = "curio-worker", version, about = "Collection tree jobs")]
pub struct Cli {
    /// Acting user; every collection touched must belong to them.
    #[arg(long, short = 'u', env = "CURIO_USER_ID")]
    pub user: DbId,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deep progress of a collection, with official stats when linked.
    Progress {
        #[arg(long, short = 'c')]
        collection: DbId,
    },

    /// Up to four representative images for each collection.
    Images {
        #[arg(long = "collection", short = 'c', required = true, num_args = 1..)]
        collections: Vec<DbId>,
    },

    /// Add a catalog collection's members to the wishlist.
    ImportCollection {
        /// Catalog collection id.
        #[arg(long)]
        dbot_collection: EntityId,

        #[arg(long, value_enum, default_value_t = ImportMode::Track)]
        mode: ImportMode,

        /// Parent for `track`, collection to fill for `add-to-existing`.
        #[arg(long)]
        target: Option<DbId>,

        /// Name of the collection created by `track`.
        #[arg(long)]
        name: Option<String>,
    },

    /// Reparent a collection. Omit `--parent` to move it to the root.
    Move {
        #[arg(long, short = 'c')]
        collection: DbId,

        #[arg(long)]
        parent: Option<DbId>,
    },

    /// Count what deleting a collection would remove.
    DeletionPreview {
        #[arg(long, short = 'c')]
        collection: DbId,
    },

    /// Completion stats for favourited catalog collections.
    Favorites {
        #[arg(long = "dbot-collection", required = true, num_args = 1..)]
        dbot_collections: Vec<EntityId>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportMode {
    Track,
    AddToExisting,
}

impl From<ImportMode> for AddCollectionMode {
    fn from(mode: ImportMode) -> Self {
        match mode {
            ImportMode::Track => AddCollectionMode::Track,
            ImportMode::AddToExisting => AddCollectionMode::AddToExisting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_import_with_kebab_case_mode() {
        let cli = Cli::try_parse_from([
            "curio-worker",
            "--user",
            "7",
            "import-collection",
            "--dbot-collection",
            "set-1",
            "--mode",
            "add-to-existing",
            "--target",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.user, 7);
        match cli.command {
            Command::ImportCollection {
                dbot_collection,
                mode,
                target,
                name,
            } => {
                assert_eq!(dbot_collection, "set-1");
                assert_eq!(mode, ImportMode::AddToExisting);
                assert_eq!(target, Some(3));
                assert_eq!(name, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn move_without_parent_targets_root() {
        let cli = Cli::try_parse_from(["curio-worker", "-u", "1", "move", "-c", "5"]).unwrap();
        match cli.command {
            Command::Move { collection, parent } => {
                assert_eq!(collection, 5);
                assert_eq!(parent, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn images_accepts_several_collections() {
        let cli =
            Cli::try_parse_from(["curio-worker", "-u", "1", "images", "-c", "1", "2", "3"]).unwrap();
        match cli.command {
            Command::Images { collections } => assert_eq!(collections, vec![1, 2, 3]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn favorites_requires_an_id() {
        assert!(Cli::try_parse_from(["curio-worker", "-u", "1", "favorites"]).is_err());
    }

    #[test]
    fn import_mode_maps_to_core_mode() {
        assert_eq!(AddCollectionMode::from(ImportMode::Track), AddCollectionMode::Track);
    }
}
