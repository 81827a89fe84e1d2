//! Baseline permission set, seeded on first start and restored by "reset to defaults".

use crate::auth::Role;

use super::{Action, Module, PermissionGrant};

const FRONT_DESK_VIEW_CREATE: [Module; 4] = [
    Module::Students,
    Module::Enrollments,
    Module::Payments,
    Module::Attendance,
];

const FRONT_DESK_VIEW_ONLY: [Module; 2] = [Module::Cycles, Module::Reports];

const STUDENT_VIEW: [Module; 3] = [Module::Enrollments, Module::Payments, Module::Attendance];

/// The baseline set. The super-role rows exist for display only; the gate
/// never consults them.
pub fn default_grants() -> Vec<PermissionGrant> {
    let mut grants = Vec::new();

    for module in Module::ALL {
        for action in Action::ALL {
            grants.push(allow(Role::Admin, module, action));
        }
    }

    for module in FRONT_DESK_VIEW_CREATE {
        grants.push(allow(Role::FrontDesk, module, Action::View));
        grants.push(allow(Role::FrontDesk, module, Action::Create));
    }
    for module in FRONT_DESK_VIEW_ONLY {
        grants.push(allow(Role::FrontDesk, module, Action::View));
    }

    for module in STUDENT_VIEW {
        grants.push(allow(Role::Student, module, Action::View));
    }

    grants
}

fn allow(role: Role, module: Module, action: Action) -> PermissionGrant {
    PermissionGrant {
        role,
        module,
        action,
        permitted: true,
    }
}
