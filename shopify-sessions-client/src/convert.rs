//! Mapping between [`Session`] and the stored [`SessionRecord`].

use crate::session::{Session, SessionAccessInfo};
use chrono::SubsecRound;
use shopify_sessions_store::{OnlineAccessInfo, SessionRecord};

/// Translate a session into the stored shape.
///
/// `expires` is truncated to millisecond precision, the precision it is
/// stored with. Access info without a user profile is dropped entirely.
pub fn to_store_shape(session: &Session) -> SessionRecord {
    let online_access_info = session.online_access_info.as_ref().and_then(|info| {
        info.associated_user
            .clone()
            .map(|associated_user| OnlineAccessInfo {
                expires_in: info.expires_in,
                associated_user_scope: info.associated_user_scope.clone(),
                associated_user,
            })
    });

    SessionRecord {
        id: session.id.clone(),
        shop: session.shop.clone(),
        state: Some(session.state.clone()),
        is_online: session.is_online,
        scope: session.scope.clone(),
        expires: session.expires.map(|expires| expires.trunc_subsecs(3)),
        access_token: session.access_token.clone(),
        online_access_info,
    }
}

/// Translate a stored record back into a session.
pub fn from_store_shape(record: SessionRecord) -> Session {
    Session {
        id: record.id,
        shop: record.shop,
        state: record.state.unwrap_or_default(),
        is_online: record.is_online,
        scope: record.scope,
        expires: record.expires,
        access_token: record.access_token,
        online_access_info: record.online_access_info.map(|info| SessionAccessInfo {
            expires_in: info.expires_in,
            associated_user_scope: info.associated_user_scope,
            associated_user: Some(info.associated_user),
        }),
    }
}
