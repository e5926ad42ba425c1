//! Synchronous digest-then-rename step run by the worker thread.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::checksum::{DigestState, ExpectedDigest, BUF_SIZE};
use crate::storage::{self, StagedFile};

use super::{CommitError, HashOutcome, HashRequest};

/// Digest the staged file; install it on a match, delete it otherwise.
pub fn hash_and_save(request: HashRequest) -> HashOutcome {
    let HashRequest {
        id,
        expected,
        final_path,
        staged,
        abort,
    } = request;
    let result = verify_and_commit(&expected, &final_path, staged, &abort);
    match &result {
        Ok(()) => tracing::info!(transfer = %id, path = %final_path.display(), "installed"),
        Err(e) => tracing::warn!(transfer = %id, path = %final_path.display(), "not installed: {}", e),
    }
    HashOutcome {
        id,
        final_path,
        result,
    }
}

fn verify_and_commit(
    expected: &ExpectedDigest,
    final_path: &Path,
    staged: StagedFile,
    abort: &AtomicBool,
) -> Result<(), CommitError> {
    let actual = match digest_staged(&staged, expected, abort) {
        Ok(Some(hex)) => hex,
        Ok(None) => {
            discard(staged);
            return Err(CommitError::Aborted);
        }
        Err(source) => {
            let path = staged.path().to_path_buf();
            discard(staged);
            return Err(CommitError::Read { path, source });
        }
    };

    if !expected.matches(&actual) {
        discard(staged);
        return Err(CommitError::Mismatch {
            algorithm: expected.algorithm,
            expected: expected.hex.trim().to_ascii_lowercase(),
            actual,
        });
    }

    if abort.load(Ordering::Acquire) {
        discard(staged);
        return Err(CommitError::Aborted);
    }

    let from = staged.path().to_path_buf();
    if let Err(source) = staged.sync() {
        discard(staged);
        return Err(CommitError::Sync { path: from, source });
    }
    staged.commit(final_path).map_err(|source| {
        let _ = storage::remove_if_exists(&from);
        CommitError::Rename {
            from: from.clone(),
            to: final_path.to_path_buf(),
            source,
        }
    })
}

/// Returns `Ok(None)` if the abort token was raised while reading.
fn digest_staged(
    staged: &StagedFile,
    expected: &ExpectedDigest,
    abort: &AtomicBool,
) -> std::io::Result<Option<String>> {
    let mut f = File::open(staged.path())?;
    let mut state = DigestState::new(expected.algorithm);
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        if abort.load(Ordering::Acquire) {
            return Ok(None);
        }
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        state.update(&buf[..n]);
    }
    Ok(Some(state.finalize_hex()))
}

fn discard(staged: StagedFile) {
    let path = staged.path().to_path_buf();
    if let Err(e) = staged.discard() {
        tracing::warn!(path = %path.display(), "could not delete staged file: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{digest_path, HashAlgorithm};
    use crate::storage::{temp_path, TempFile};
    use crate::transport::TransferId;
    use std::sync::Arc;

    fn stage(dir: &Path, name: &str, body: &[u8]) -> (std::path::PathBuf, StagedFile) {
        let final_path = dir.join(name);
        let mut temp = TempFile::create(&temp_path(&final_path)).unwrap();
        temp.append(body).unwrap();
        (final_path, temp.close().unwrap())
    }

    fn sha256_of(body: &[u8]) -> String {
        let f = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(f.path(), body).unwrap();
        digest_path(f.path(), HashAlgorithm::Sha256).unwrap()
    }

    fn request(final_path: &Path, staged: StagedFile, expected: ExpectedDigest) -> HashRequest {
        HashRequest {
            id: TransferId(1),
            expected,
            final_path: final_path.to_path_buf(),
            staged,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn matching_digest_installs() {
        let dir = tempfile::tempdir().unwrap();
        let body = b"model weights".to_vec();
        let (final_path, staged) = stage(dir.path(), "model-a.bin", &body);
        let expected = ExpectedDigest::sha256(sha256_of(&body).to_uppercase());

        let outcome = hash_and_save(request(&final_path, staged, expected));

        assert!(outcome.is_installed());
        assert_eq!(std::fs::read(&final_path).unwrap(), body);
        assert!(!temp_path(&final_path).exists());
    }

    #[test]
    fn mismatch_deletes_temp_and_leaves_final_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (final_path, staged) = stage(dir.path(), "model-b.bin", b"corrupted");
        let expected = ExpectedDigest::sha256(sha256_of(b"the real thing"));

        let outcome = hash_and_save(request(&final_path, staged, expected));

        match outcome.result {
            Err(CommitError::Mismatch { algorithm, .. }) => {
                assert_eq!(algorithm, HashAlgorithm::Sha256)
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
        assert!(!temp_path(&final_path).exists());
        assert!(!final_path.exists());
    }

    #[test]
    fn mismatch_keeps_previously_installed_file() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("model-c.bin");
        std::fs::write(&final_path, b"old good copy").unwrap();
        let (_, staged) = stage(dir.path(), "model-c.bin", b"bad bytes");
        let expected = ExpectedDigest::md5("00000000000000000000000000000000");

        let outcome = hash_and_save(request(&final_path, staged, expected));

        assert!(!outcome.is_installed());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"old good copy");
    }

    #[test]
    fn raised_abort_token_discards() {
        let dir = tempfile::tempdir().unwrap();
        let body = b"abc".to_vec();
        let (final_path, staged) = stage(dir.path(), "model-d.bin", &body);
        let req = request(&final_path, staged, ExpectedDigest::sha256(sha256_of(&body)));
        req.abort.store(true, Ordering::Release);

        let outcome = hash_and_save(req);

        assert!(matches!(outcome.result, Err(CommitError::Aborted)));
        assert!(!final_path.exists());
        assert!(!temp_path(&final_path).exists());
    }

    #[test]
    fn missing_staged_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let (final_path, staged) = stage(dir.path(), "model-e.bin", b"x");
        std::fs::remove_file(staged.path()).unwrap();

        let outcome = hash_and_save(request(&final_path, staged, ExpectedDigest::md5("x")));

        match outcome.result {
            Err(e @ CommitError::Read { .. }) => assert!(!e.is_integrity()),
            other => panic!("expected read error, got {:?}", other),
        }
    }
}
