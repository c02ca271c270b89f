// Contact-field visibility. Every branch fails closed.
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::common::{is_valid_identifier, require_identifier, ContactPrivacy, Profile, ServiceError, ServiceResult};
use crate::server::store::{ConnectionStore, ProfileStore};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContactVisibility {
    pub can_view_email: bool,
    pub can_view_phone: bool,
}

impl ContactVisibility {
    pub const VISIBLE: Self = Self { can_view_email: true, can_view_phone: true };
    pub const HIDDEN: Self = Self { can_view_email: false, can_view_phone: false };

    fn both(visible: bool) -> Self {
        if visible { Self::VISIBLE } else { Self::HIDDEN }
    }
}

/// Decides whether `viewer_user_id` may see the contact fields of `target_user_id`.
///
/// Evaluated in order: owner, public, private, then connection lookup. Malformed ids
/// and lookup errors resolve to hidden. One store read at most, nothing cached.
pub async fn resolve_contact_visibility<C: ConnectionStore + ?Sized>(
    store: &C,
    target_user_id: &str,
    viewer_user_id: &str,
    privacy: ContactPrivacy,
) -> ContactVisibility {
    if target_user_id == viewer_user_id {
        return ContactVisibility::VISIBLE;
    }
    match privacy {
        ContactPrivacy::Public => ContactVisibility::VISIBLE,
        ContactPrivacy::Private => ContactVisibility::HIDDEN,
        ContactPrivacy::Connections => {
            if !is_valid_identifier(target_user_id) || !is_valid_identifier(viewer_user_id) {
                warn!("[PRIVACY] Malformed id in visibility check ({:?}, {:?}), hiding contact fields", target_user_id, viewer_user_id);
                return ContactVisibility::HIDDEN;
            }
            match store.connection_exists(target_user_id, viewer_user_id).await {
                Ok(connected) => {
                    debug!("[PRIVACY] {} -> {} connected={}", viewer_user_id, target_user_id, connected);
                    ContactVisibility::both(connected)
                }
                Err(e) => {
                    warn!("[PRIVACY] Connection lookup failed for {} -> {}: {}", viewer_user_id, target_user_id, e);
                    ContactVisibility::HIDDEN
                }
            }
        }
    }
}

/// Copy of `profile` with email and phone cleared wherever the viewer may not see them.
pub async fn sanitize_profile_for_viewer<C: ConnectionStore + ?Sized>(
    store: &C,
    profile: &Profile,
    viewer_user_id: &str,
) -> Profile {
    let visibility = resolve_contact_visibility(store, &profile.id, viewer_user_id, profile.contact_privacy).await;
    let mut sanitized = profile.clone();
    if !visibility.can_view_email {
        sanitized.email = None;
    }
    if !visibility.can_view_phone {
        sanitized.phone = None;
    }
    sanitized
}

/// Fetches a profile and sanitises it for the viewer. `None` when it does not exist.
pub async fn load_profile_for_viewer<S: ProfileStore + ConnectionStore + ?Sized>(
    store: &S,
    profile_id: &str,
    viewer_user_id: &str,
) -> ServiceResult<Option<Profile>> {
    require_identifier(profile_id)?;
    match store.fetch_profile(profile_id).await? {
        Some(profile) => Ok(Some(sanitize_profile_for_viewer(store, &profile, viewer_user_id).await)),
        None => Ok(None),
    }
}

/// Only the owner may change their own contact privacy.
pub async fn update_contact_privacy<S: ProfileStore + ?Sized>(
    store: &S,
    actor_id: &str,
    profile_id: &str,
    setting: ContactPrivacy,
) -> ServiceResult<()> {
    require_identifier(actor_id)?;
    require_identifier(profile_id)?;
    if actor_id != profile_id {
        return Err(ServiceError::NotOwner {
            actor: actor_id.to_string(),
            profile_id: profile_id.to_string(),
        });
    }
    if !store.update_contact_privacy(profile_id, setting).await? {
        return Err(ServiceError::ProfileNotFound(profile_id.to_string()));
    }
    debug!("[PRIVACY] {} set contact privacy to {}", profile_id, setting.as_str());
    Ok(())
}
