//! The invoking account: identity, stored secret, privilege drop
//!
//! [`SystemAccounts`] is the real implementation on top of the password
//! database and the shadow file. Reading the shadow file normally requires
//! the binary to be installed setuid root or setgid shadow. Privileges,
//! saved ids included, are given up for good right after.

use std::ffi::CStr;
use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{LockError, Result};

/// Placeholder in the password database meaning "see the shadow file"
const SHADOW_PLACEHOLDER: &str = "x";

/// Upper bound for the getpwuid_r scratch buffer
const MAX_PASSWD_BUFFER: usize = 1 << 20;

/// The account that started the locker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// Stored password hash, wiped from memory when dropped
pub struct StoredSecret(Zeroizing<String>);

impl StoredSecret {
    pub fn new(hash: String) -> Self {
        Self(Zeroizing::new(hash))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoredSecret(..)")
    }
}

/// Credential collaborator
pub trait AccountSource {
    /// Resolve the real uid to an account
    fn identity(&self) -> Result<Identity>;

    /// Read the stored password hash. May need elevated privilege.
    fn stored_secret(&self, identity: &Identity) -> Result<StoredSecret>;

    /// Permanently become `identity`, process wide
    fn drop_privileges(&self, identity: &Identity) -> Result<()>;
}

/// Password database, shadow file and setuid(2)
#[derive(Clone, Debug)]
pub struct SystemAccounts {
    shadow_path: PathBuf,
}

impl SystemAccounts {
    pub fn new(shadow_path: impl Into<PathBuf>) -> Self {
        Self {
            shadow_path: shadow_path.into(),
        }
    }
}

impl Default for SystemAccounts {
    fn default() -> Self {
        Self::new("/etc/shadow")
    }
}

struct PasswdEntry {
    identity: Identity,
    password: Zeroizing<String>,
}

fn lookup_passwd(uid: libc::uid_t) -> io::Result<Option<PasswdEntry>> {
    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    loop {
        // SAFETY: an all-zero passwd is a valid out-parameter; getpwuid_r fills
        // it with pointers into `buf`, which outlives every read below.
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = unsafe { libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };

        if rc == libc::ERANGE && buf.len() < MAX_PASSWD_BUFFER {
            let grown = buf.len() * 2;
            buf.resize(grown, 0);
            continue;
        }
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        if result.is_null() {
            return Ok(None);
        }

        // SAFETY: on success the string fields point at NUL-terminated data in `buf`.
        let name = unsafe { CStr::from_ptr(pwd.pw_name) }
            .to_string_lossy()
            .into_owned();
        let password = if pwd.pw_passwd.is_null() {
            Zeroizing::new(String::new())
        } else {
            Zeroizing::new(
                unsafe { CStr::from_ptr(pwd.pw_passwd) }
                    .to_string_lossy()
                    .into_owned(),
            )
        };

        return Ok(Some(PasswdEntry {
            identity: Identity {
                name,
                uid: pwd.pw_uid,
                gid: pwd.pw_gid,
            },
            password,
        }));
    }
}

/// Hash field of `name`'s entry in shadow-format `contents`
pub fn shadow_hash(contents: &str, name: &str) -> Option<StoredSecret> {
    contents.lines().find_map(|line| {
        let mut fields = line.split(':');
        if fields.next()? != name {
            return None;
        }
        fields.next().map(|hash| StoredSecret::new(hash.to_string()))
    })
}

impl AccountSource for SystemAccounts {
    fn identity(&self) -> Result<Identity> {
        // SAFETY: getuid cannot fail.
        let uid = unsafe { libc::getuid() };
        match lookup_passwd(uid) {
            Ok(Some(entry)) => Ok(entry.identity),
            Ok(None) => Err(LockError::NoIdentity),
            Err(e) => Err(LockError::CredentialSource(e.to_string())),
        }
    }

    fn stored_secret(&self, identity: &Identity) -> Result<StoredSecret> {
        let entry = lookup_passwd(identity.uid)
            .map_err(|e| LockError::CredentialSource(e.to_string()))?
            .ok_or(LockError::NoIdentity)?;

        if entry.password.as_str() != SHADOW_PLACEHOLDER {
            return Ok(StoredSecret::new(entry.password.as_str().to_string()));
        }

        debug!(path = %self.shadow_path.display(), "reading shadow entry");
        let contents = Zeroizing::new(fs::read_to_string(&self.shadow_path).map_err(|e| {
            LockError::CredentialSource(format!(
                "cannot read {} ({}); make sure veil is setuid root",
                self.shadow_path.display(),
                e
            ))
        })?);
        shadow_hash(&contents, &identity.name).ok_or_else(|| {
            LockError::CredentialSource(format!("no shadow entry for {}", identity.name))
        })
    }

    fn drop_privileges(&self, identity: &Identity) -> Result<()> {
        let gid: libc::gid_t = identity.gid;
        let uid: libc::uid_t = identity.uid;
        let last_error = || LockError::PrivilegeDrop(io::Error::last_os_error().to_string());

        // SAFETY: plain syscalls on process credentials; `gid` outlives setgroups.
        let (orig_euid, orig_egid) = unsafe { (libc::geteuid(), libc::getegid()) };
        unsafe {
            if orig_euid == 0 && libc::setgroups(1, &gid) != 0 {
                return Err(last_error());
            }
            // Saved ids too, or a setgid/setuid binary could switch back.
            if libc::setresgid(gid, gid, gid) != 0 {
                return Err(last_error());
            }
            if libc::setresuid(uid, uid, uid) != 0 {
                return Err(last_error());
            }
        }

        ProcessIds::current()?.check_dropped_to(identity)?;

        // SAFETY: as above. Each call is expected to fail with EPERM.
        unsafe {
            if orig_egid != gid && libc::setegid(orig_egid) == 0 {
                return Err(LockError::PrivilegeDrop("original group is recoverable".to_string()));
            }
            if orig_euid != uid && libc::seteuid(orig_euid) == 0 {
                return Err(LockError::PrivilegeDrop("original user is recoverable".to_string()));
            }
            if uid != 0 && libc::setuid(0) == 0 {
                return Err(LockError::PrivilegeDrop("root privileges are recoverable".to_string()));
            }
        }

        debug!(uid, gid, "privileges dropped");
        Ok(())
    }
}

/// Real, effective and saved ids of this process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ProcessIds {
    uid: [libc::uid_t; 3],
    gid: [libc::gid_t; 3],
}

impl ProcessIds {
    fn current() -> Result<Self> {
        let mut uid: [libc::uid_t; 3] = [0; 3];
        let mut gid: [libc::gid_t; 3] = [0; 3];
        // SAFETY: each pointer refers to a distinct live array element.
        let rc = unsafe {
            let [ru, eu, su] = &mut uid;
            let [rg, eg, sg] = &mut gid;
            libc::getresuid(ru, eu, su) | libc::getresgid(rg, eg, sg)
        };
        if rc != 0 {
            return Err(LockError::PrivilegeDrop(io::Error::last_os_error().to_string()));
        }
        Ok(Self { uid, gid })
    }

    fn check_dropped_to(&self, identity: &Identity) -> Result<()> {
        if self.uid.iter().any(|&id| id != identity.uid) {
            return Err(LockError::PrivilegeDrop(format!("user ids still {:?}", self.uid)));
        }
        if self.gid.iter().any(|&id| id != identity.gid) {
            return Err(LockError::PrivilegeDrop(format!("group ids still {:?}", self.gid)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SHADOW: &str = "root:!:19000:0:99999:7:::\n\
                          alice:$6$salt$hash:19000:0:99999:7:::\n\
                          bob::19000::::::\n";

    #[test]
    fn test_shadow_lookup() {
        assert_eq!(shadow_hash(SHADOW, "alice").unwrap().as_str(), "$6$salt$hash");
        assert_eq!(shadow_hash(SHADOW, "root").unwrap().as_str(), "!");
        assert_eq!(shadow_hash(SHADOW, "bob").unwrap().as_str(), "");
        assert!(shadow_hash(SHADOW, "carol").is_none());
        assert!(shadow_hash(SHADOW, "ali").is_none());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = StoredSecret::new("$6$salt$hash".to_string());
        assert_eq!(format!("{:?}", secret), "StoredSecret(..)");
    }

    #[test]
    fn test_identity_matches_real_uid() {
        let accounts = SystemAccounts::default();
        match accounts.identity() {
            Ok(identity) => assert_eq!(identity.uid, unsafe { libc::getuid() }),
            Err(LockError::NoIdentity) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn test_missing_shadow_file_is_a_source_error() {
        let dir = tempdir().unwrap();
        let accounts = SystemAccounts::new(dir.path().join("shadow"));
        let Ok(identity) = accounts.identity() else {
            return;
        };
        match accounts.stored_secret(&identity) {
            // Accounts whose passwd field is not the shadow placeholder never
            // touch the shadow file.
            Ok(_) => {}
            Err(e) => assert!(matches!(e, LockError::CredentialSource(_))),
        }
    }

    fn alice() -> Identity {
        Identity {
            name: "alice".to_string(),
            uid: 1000,
            gid: 1000,
        }
    }

    #[test]
    fn test_dropped_ids_must_all_match() {
        let dropped = ProcessIds {
            uid: [1000; 3],
            gid: [1000; 3],
        };
        assert!(dropped.check_dropped_to(&alice()).is_ok());

        // setgid-shadow install that only reset the real and effective gid
        let saved_shadow_gid = ProcessIds {
            uid: [1000; 3],
            gid: [1000, 1000, 42],
        };
        assert!(matches!(
            saved_shadow_gid.check_dropped_to(&alice()),
            Err(LockError::PrivilegeDrop(_))
        ));

        let saved_root_uid = ProcessIds {
            uid: [1000, 1000, 0],
            gid: [1000; 3],
        };
        assert!(matches!(
            saved_root_uid.check_dropped_to(&alice()),
            Err(LockError::PrivilegeDrop(_))
        ));
    }

    #[test]
    fn test_current_ids_are_readable() {
        let ids = ProcessIds::current().unwrap();
        // SAFETY: getuid and getgid cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        assert_eq!(ids.uid[0], uid);
        assert_eq!(ids.gid[0], gid);
    }

    #[test]
    fn test_drop_to_own_identity_when_unprivileged() {
        // SAFETY: credential queries cannot fail.
        let (uid, euid, gid, egid) =
            unsafe { (libc::getuid(), libc::geteuid(), libc::getgid(), libc::getegid()) };
        if euid == 0 || uid != euid || gid != egid {
            // Would change the credentials of the whole test process.
            return;
        }
        let identity = Identity {
            name: "self".to_string(),
            uid,
            gid,
        };
        SystemAccounts::default().drop_privileges(&identity).unwrap();
    }
}
