//! Lifecycle hooks.
//!
//! A descriptor may register any number of callbacks per [`HookName`]. They
//! run sequentially in registration order, all mutating the same record;
//! the first error aborts the rest of the chain.

use std::fmt;
use std::sync::Arc;

use crate::descriptor::ModelDescriptor;
use crate::error::Result;
use crate::record::Record;

/// A lifecycle callback.
///
/// Hooks may run more than once per logical operation (the retrying modify
/// re-runs the whole save pipeline), so they must not touch state outside
/// the record.
pub type HookFn = Arc<dyn Fn(&mut Record) -> Result<()> + Send + Sync>;

/// Points in the record lifecycle where callbacks can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    /// Before the validator runs.
    BeforeValidation,
    /// After validation succeeded.
    AfterValidation,
    /// Before INSERT or UPDATE, once the change-set is known to be non-empty.
    BeforeSave,
    /// After INSERT, on the returned row.
    AfterCreate,
    /// After UPDATE, on the returned row.
    AfterUpdate,
    /// After `AfterCreate` / `AfterUpdate`.
    AfterSave,
    /// On every record read from storage.
    AfterFetch,
}

impl HookName {
    /// Every hook, in lifecycle order.
    pub const ALL: [HookName; 7] = [
        HookName::BeforeValidation,
        HookName::AfterValidation,
        HookName::BeforeSave,
        HookName::AfterCreate,
        HookName::AfterUpdate,
        HookName::AfterSave,
        HookName::AfterFetch,
    ];

    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            HookName::BeforeValidation => "beforeValidation",
            HookName::AfterValidation => "afterValidation",
            HookName::BeforeSave => "beforeSave",
            HookName::AfterCreate => "afterCreate",
            HookName::AfterUpdate => "afterUpdate",
            HookName::AfterSave => "afterSave",
            HookName::AfterFetch => "afterFetch",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run every callback registered for `hook` against `record`.
///
/// A hook with no callbacks passes the record through untouched.
pub fn run_hooks(descriptor: &ModelDescriptor, record: &mut Record, hook: HookName) -> Result<()> {
    let callbacks = descriptor.hooks(hook);
    if callbacks.is_empty() {
        return Ok(());
    }
    tracing::trace!(
        model = descriptor.name(),
        hook = hook.as_str(),
        callbacks = callbacks.len(),
        "running hooks"
    );
    for callback in callbacks {
        callback(record)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::value::Value;

    #[test]
    fn test_hooks_run_in_order() {
        let d = ModelDescriptor::builder("note")
            .hook(HookName::BeforeSave, |r| {
                r.set("trail", "a");
                Ok(())
            })
            .hook(HookName::BeforeSave, |r| {
                let prev = r.get("trail").and_then(Value::as_str).unwrap_or("").to_string();
                r.set("trail", format!("{prev}b"));
                Ok(())
            })
            .build();

        let mut record = Record::new();
        run_hooks(&d, &mut record, HookName::BeforeSave).unwrap();
        assert_eq!(record.get("trail"), Some(&Value::from("ab")));
    }

    #[test]
    fn test_error_stops_chain() {
        let d = ModelDescriptor::builder("note")
            .hook(HookName::AfterFetch, |_| Err(Error::custom("nope")))
            .hook(HookName::AfterFetch, |r| {
                r.set("reached", true);
                Ok(())
            })
            .build();

        let mut record = Record::new();
        let err = run_hooks(&d, &mut record, HookName::AfterFetch).unwrap_err();
        assert_eq!(err.to_string(), "nope");
        assert!(record.get("reached").is_none());
    }

    #[test]
    fn test_missing_hook_is_passthrough() {
        let d = ModelDescriptor::builder("note").build();
        let mut record = Record::new().with("x", 1);
        run_hooks(&d, &mut record, HookName::AfterSave).unwrap();
        assert_eq!(record, Record::new().with("x", 1));
    }
}
