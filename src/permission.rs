//! Pure permission decisions.
//!
//! Evaluated fresh on every request: room flags can flip between two events
//! on the same connection, so nothing here is cached.

use crate::chat::{ChatRoom, RoomType};
use crate::entity::Role;
use crate::error::PermissionDenied;
use crate::session::ConnectionSession;

pub type Decision = Result<(), PermissionDenied>;

const SEND_ROLES: &[Role] = &[
    Role::SuperAdmin,
    Role::AreaManager,
    Role::PropertyOwner,
    Role::Tenant,
    Role::WebsiteUser,
];

// Super admins sit at the top of the ladder and cannot escalate further.
const ESCALATE_ROLES: &[Role] = &[
    Role::AreaManager,
    Role::PropertyOwner,
    Role::Tenant,
    Role::WebsiteUser,
];

pub fn can_join(room: &ChatRoom, login_id: &str, role: Role) -> Decision {
    if role == Role::SuperAdmin {
        return Ok(());
    }
    if !room.is_participant(login_id) {
        return Err(PermissionDenied::NotParticipant);
    }
    match room.room_type {
        RoomType::OwnerWebsiteUser if !room.owner_accepted => Err(PermissionDenied::OwnerNotAccepted),
        RoomType::OwnerTenant if !room.tenant_assigned => Err(PermissionDenied::TenantNotAssigned),
        _ => Ok(()),
    }
}

pub fn can_send(session: &ConnectionSession) -> Decision {
    let identity = session.identity().ok_or(PermissionDenied::NotJoined)?;
    if !SEND_ROLES.contains(&identity.role) {
        return Err(PermissionDenied::RoleNotAllowed);
    }
    session.current_room().ok_or(PermissionDenied::NotJoined)?;
    Ok(())
}

pub fn can_escalate(session: &ConnectionSession) -> Decision {
    let identity = session.identity().ok_or(PermissionDenied::NotJoined)?;
    session.current_room().ok_or(PermissionDenied::NotJoined)?;
    if !ESCALATE_ROLES.contains(&identity.role) {
        return Err(PermissionDenied::RoleNotAllowed);
    }
    Ok(())
}
