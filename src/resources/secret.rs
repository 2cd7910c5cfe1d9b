use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube::core::ObjectMeta;
use rand::Rng;

use crate::crd::XtraDBCluster;
use crate::resources::common::component_labels;

/// Key holding the database user name
pub const USERNAME_KEY: &str = "username";

/// Key holding the database password
pub const PASSWORD_KEY: &str = "password";

/// Generate a secure random password
fn generate_password(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Generate the root credentials Secret
///
/// The secret carries no owner reference: whether it is garbage collected
/// with the database is decided at deletion time by the termination policy.
pub fn generate_auth_secret(db: &XtraDBCluster) -> Secret {
    let string_data = BTreeMap::from([
        (USERNAME_KEY.to_string(), "root".to_string()),
        (PASSWORD_KEY.to_string(), generate_password(16)),
    ]);

    Secret {
        metadata: ObjectMeta {
            name: Some(db.auth_secret_name()),
            namespace: db.namespace(),
            labels: Some(component_labels(&db.name_any(), "database")),
            ..Default::default()
        },
        type_: Some("kubernetes.io/basic-auth".to_string()),
        string_data: Some(string_data),
        ..Default::default()
    }
}
