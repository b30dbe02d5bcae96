use crate::change::ChangeEvent;
use crate::core::SoftDeletable;

/// An update that sets a previously empty soft-delete marker is a delete.
pub fn is_soft_delete<T: SoftDeletable>(before: &T, after: &T) -> bool {
    before.deleted_at().is_none() && after.deleted_at().is_some()
}

/// What an event does to a projection once soft deletes are folded into
/// removals. Clearing the marker is an ordinary update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect<T> {
    Insert(T),
    Update(T),
    /// `image` is the row being removed: the new image of a soft delete,
    /// the old image of a hard delete.
    Remove { image: T, soft: bool },
}

pub fn effect_of<T: SoftDeletable>(event: ChangeEvent<T>) -> Effect<T> {
    match event {
        ChangeEvent::Insert { after } => Effect::Insert(after),
        ChangeEvent::Update { before, after } if is_soft_delete(&before, &after) => Effect::Remove {
            image: after,
            soft: true,
        },
        ChangeEvent::Update { after, .. } => Effect::Update(after),
        ChangeEvent::Delete { before } => Effect::Remove {
            image: before,
            soft: false,
        },
    }
}
