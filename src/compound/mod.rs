//! Multi-key mutations executed atomically as server-side scripts.
//!
//! Every script answers with a status token: `ok` on success, or one of the
//! [`Conflict`] tokens when a business rule stops it before any write.

mod indexed;
mod roles;

pub use indexed::{Indexed, IndexedCollection, LexicalIndex};
pub use roles::RoleTable;

use crate::error::{Conflict, Result, StoreError};
use crate::keyspace::Reply;

pub(crate) const OK_TOKEN: &str = "ok";

/// Translate a script's status reply into `Ok` or a typed conflict.
pub(crate) fn expect_ok(op: &str, reply: Reply) -> Result<()> {
    let token = match &reply {
        Reply::Bulk(Some(raw)) => String::from_utf8_lossy(raw).into_owned(),
        Reply::Status(s) => s.to_lowercase(),
        _ => {
            return Err(StoreError::protocol(format!(
                "{}: expected a status token, got {:?}",
                op, reply
            )))
        }
    };
    if token == OK_TOKEN {
        return Ok(());
    }
    match Conflict::from_token(&token) {
        Some(conflict) => Err(StoreError::Conflict(conflict)),
        None => Err(StoreError::protocol(format!("{}: unknown status {:?}", op, token))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_expect_ok_translates_tokens() {
        assert!(expect_ok("t", Reply::bulk(Bytes::from_static(b"ok"))).is_ok());
        assert!(expect_ok("t", Reply::ok()).is_ok());
        assert_eq!(
            expect_ok("t", Reply::bulk(Bytes::from_static(b"last-holder"))).unwrap_err(),
            StoreError::Conflict(Conflict::LastHolder)
        );
        assert!(matches!(
            expect_ok("t", Reply::bulk(Bytes::from_static(b"weird"))),
            Err(StoreError::Protocol(_))
        ));
        assert!(matches!(expect_ok("t", Reply::Integer(1)), Err(StoreError::Protocol(_))));
    }
}
