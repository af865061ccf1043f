use crate::queries::does_entry_exist;
use log::debug;
use opfs_lib::{EntryId, EntryIdGenerator, FileSystemChildMetadata, FsError, FsResult};
use rusqlite::Connection;

pub const DEFAULT_MAX_ID_ROUNDS: u32 = 1024;

/// Derives an id for `child` that no entry uses yet.
///
/// On a collision the rejected candidate becomes the parent of the next
/// generator input. `max_rounds` only guards against a broken generator.
pub(crate) fn get_unique_entry_id(
    conn: &Connection,
    id_gen: &dyn EntryIdGenerator,
    child: &FileSystemChildMetadata,
    max_rounds: u32,
) -> FsResult<EntryId> {
    let mut generator_input = child.clone();

    for round in 0..max_rounds {
        let entry_id = id_gen.derive_id(&generator_input)?;
        if !does_entry_exist(conn, &entry_id)? {
            return Ok(entry_id);
        }
        debug!(
            "entry id {} for {} already in use, round {}",
            entry_id, child.child_name, round
        );
        generator_input.parent_id = entry_id;
    }

    Err(FsError::Internal(format!(
        "no unique entry id for {} after {} rounds",
        child.child_name, max_rounds
    )))
}
