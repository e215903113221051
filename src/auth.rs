/// Authorization decisions for RPC handlers. The policy engine is
/// initialized from a model file declaring the `(sub, obj, act)`
/// request tuple and a CSV policy file of ground facts; subjects come
/// from the TLS peer certificate's Common Name.
use std::path::Path;

use casbin::{CoreApi, DefaultModel, Enforcer, FileAdapter};

use crate::error::{Error, Result};

pub struct Authorizer {
  enforcer: Enforcer,
}

impl Authorizer {
  pub async fn new(
    model_file: impl AsRef<Path> + Send + Sync,
    policy_file: impl AsRef<Path> + Send + Sync + 'static,
  ) -> Result<Self> {
    let model = DefaultModel::from_file(model_file)
      .await
      .map_err(|e| Error::Internal(format!("failed to load acl policy: {e}")))?;
    let adapter = FileAdapter::new(policy_file);

    let enforcer = Enforcer::new(model, adapter)
      .await
      .map_err(|e| Error::Internal(format!("failed to load acl policy: {e}")))?;

    Ok(Self { enforcer })
  }

  /// Returns `PermissionDenied` unless the policy allows the subject to
  /// perform the action on the object.
  pub fn authorize(&self, subject: &str, object: &str, action: &str) -> Result<()> {
    let allowed = self
      .enforcer
      .enforce((subject, object, action))
      .map_err(|e| Error::Internal(format!("acl evaluation failed: {e}")))?;

    if allowed {
      Ok(())
    } else {
      Err(Error::PermissionDenied {
        subject: subject.to_string(),
        object: object.to_string(),
        action: action.to_string(),
      })
    }
  }
}
