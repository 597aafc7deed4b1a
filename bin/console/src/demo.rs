//! Demo accounts for the console.

use expense_desk_platform_access::memory::{
    InMemoryIdentityProvider, InMemoryOrganizationResolver, InMemoryProfileStore,
};
use expense_desk_platform_access::{Membership, Organization, Role, UserProfile};
use tracing::info;

const ACCOUNTS: [(&str, &str, Role, bool); 3] = [
    ("admin@expense.test", "Avery Admin", Role::Admin, true),
    ("finance@expense.test", "Fran Finance", Role::Finance, true),
    ("employee@expense.test", "Eli Employee", Role::Employee, false),
];

/// Creates the demo accounts. Members of the shared organization get a
/// membership; the employee starts without one.
pub fn seed(
    identity: &InMemoryIdentityProvider,
    profiles: &InMemoryProfileStore,
    organizations: &InMemoryOrganizationResolver,
    password: &str,
) {
    let organization = Organization::new("Acme Travel");
    for (email, name, role, member) in ACCOUNTS {
        let user = identity.add_account(email, password);
        profiles.insert(UserProfile::new(user.id, email, Some(name.to_string()), role));
        if member {
            organizations.add_membership(
                organization.clone(),
                Membership::new(&organization, user.id, role),
            );
        }
        info!(email, role = %role, member, "seeded demo account");
    }
}
