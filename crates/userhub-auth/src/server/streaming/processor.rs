use crate::server::store::UserStore;
use userhub_core::{Error, Result, pagination::PageDescriptor, proto::Users};

/// Computes the result chunk for a single page descriptor.
///
/// The slice is taken from the store as it is at call time. Nothing is
/// snapshotted per session, so users created or removed between two calls are
/// reflected in the later chunk.
///
/// # Errors
///
/// Returns [`Error::InvalidDescriptor`] if the descriptor is wider than
/// `max_page_size`. The caller treats this as fatal for the whole session.
pub fn process_page(
    store: &UserStore,
    descriptor: PageDescriptor,
    max_page_size: u32,
) -> Result<Users> {
    if descriptor.size() > max_page_size {
        return Err(Error::InvalidDescriptor {
            reason: format!(
                "page {}: size {} exceeds maximum allowed ({})",
                descriptor.page(),
                descriptor.size(),
                max_page_size
            ),
        });
    }

    let users = store.slice(&descriptor);

    #[cfg(feature = "tracing")]
    tracing::trace!(
        page = descriptor.page(),
        size = descriptor.size(),
        returned = users.len(),
        "Computed chunk"
    );

    Ok(Users { users })
}
