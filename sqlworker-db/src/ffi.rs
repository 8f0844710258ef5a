//! Raw FFI bindings to SQLite.
//!
//! The symbols resolve against the amalgamation bundled by `libsqlite3-sys`,
//! compiled with `SQLITE_ENABLE_SESSION` and `SQLITE_ENABLE_PREUPDATE_HOOK`
//! through the crate's `session` feature.
//!
//! All pointer types use `*mut c_void` so that engine types do not leak into
//! the rest of the crate. This is the **only** file that contains `unsafe`
//! code or C types: [`RawDb`], [`RawStmt`], [`RawSession`] and the free
//! functions at the bottom are everything the safe wrappers build on.

#![allow(non_camel_case_types)]

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uchar, c_void};
use std::ptr;

use super::error::{DbError, DbResult};

// ── SQLite constants ────────────────────────────────────────────────────

pub const SQLITE_OK: c_int = 0;
pub const SQLITE_ERROR: c_int = 1;
pub const SQLITE_NOMEM: c_int = 7;
pub const SQLITE_TOOBIG: c_int = 18;
pub const SQLITE_MISUSE: c_int = 21;
pub const SQLITE_ROW: c_int = 100;
pub const SQLITE_DONE: c_int = 101;

// Column type constants
pub const SQLITE_INTEGER: c_int = 1;
pub const SQLITE_FLOAT: c_int = 2;
pub const SQLITE_TEXT: c_int = 3;
pub const SQLITE_BLOB: c_int = 4;
pub const SQLITE_NULL: c_int = 5;

// Open flags
pub const SQLITE_OPEN_READONLY: c_int = 0x0000_0001;
pub const SQLITE_OPEN_READWRITE: c_int = 0x0000_0002;
pub const SQLITE_OPEN_CREATE: c_int = 0x0000_0004;
pub const SQLITE_OPEN_MEMORY: c_int = 0x0000_0080;
pub const SQLITE_OPEN_FULLMUTEX: c_int = 0x0001_0000;

// Update hook action codes
pub const SQLITE_DELETE: c_int = 9;
pub const SQLITE_INSERT: c_int = 18;
pub const SQLITE_UPDATE: c_int = 23;

const SQLITE_DESERIALIZE_FREEONCLOSE: u32 = 1;
const SQLITE_DESERIALIZE_RESIZEABLE: u32 = 2;

const SQLITE_CHANGESET_DATA: c_int = 1;
const SQLITE_CHANGESET_CONFLICT: c_int = 3;
const SQLITE_CHANGESET_OMIT: c_int = 0;
const SQLITE_CHANGESET_REPLACE: c_int = 1;

// Destructor type aliases (transient = -1 means SQLite copies the data)
const SQLITE_TRANSIENT: isize = -1;

// ── Native symbols ──────────────────────────────────────────────────────

type sqlite3 = c_void;
type sqlite3_stmt = c_void;
type sqlite3_backup = c_void;
type sqlite3_session = c_void;
type sqlite3_changeset_iter = c_void;

type ExecCallback =
    unsafe extern "C" fn(*mut c_void, c_int, *mut *mut c_char, *mut *mut c_char) -> c_int;
type UpdateHookCallback =
    unsafe extern "C" fn(*mut c_void, c_int, *const c_char, *const c_char, i64);
type ChangesetFilter = unsafe extern "C" fn(*mut c_void, *const c_char) -> c_int;
type ChangesetConflict =
    unsafe extern "C" fn(*mut c_void, c_int, *mut sqlite3_changeset_iter) -> c_int;

extern "C" {
    // Connection lifecycle
    fn sqlite3_open_v2(
        filename: *const c_char,
        pp_db: *mut *mut sqlite3,
        flags: c_int,
        z_vfs: *const c_char,
    ) -> c_int;
    fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;

    // Execution
    fn sqlite3_exec(
        db: *mut sqlite3,
        sql: *const c_char,
        callback: Option<ExecCallback>,
        arg: *mut c_void,
        errmsg: *mut *mut c_char,
    ) -> c_int;

    // Memory
    fn sqlite3_malloc64(n: u64) -> *mut c_void;
    fn sqlite3_free(ptr: *mut c_void);

    // Prepared statements
    fn sqlite3_prepare_v2(
        db: *mut sqlite3,
        z_sql: *const c_char,
        n_byte: c_int,
        pp_stmt: *mut *mut sqlite3_stmt,
        pz_tail: *mut *const c_char,
    ) -> c_int;
    fn sqlite3_step(stmt: *mut sqlite3_stmt) -> c_int;
    fn sqlite3_reset(stmt: *mut sqlite3_stmt) -> c_int;
    fn sqlite3_clear_bindings(stmt: *mut sqlite3_stmt) -> c_int;
    fn sqlite3_finalize(stmt: *mut sqlite3_stmt) -> c_int;
    fn sqlite3_next_stmt(db: *mut sqlite3, stmt: *mut sqlite3_stmt) -> *mut sqlite3_stmt;

    // Parameter binding
    fn sqlite3_bind_null(stmt: *mut sqlite3_stmt, index: c_int) -> c_int;
    fn sqlite3_bind_int(stmt: *mut sqlite3_stmt, index: c_int, value: c_int) -> c_int;
    fn sqlite3_bind_int64(stmt: *mut sqlite3_stmt, index: c_int, value: i64) -> c_int;
    fn sqlite3_bind_double(stmt: *mut sqlite3_stmt, index: c_int, value: f64) -> c_int;
    fn sqlite3_bind_text(
        stmt: *mut sqlite3_stmt,
        index: c_int,
        value: *const c_char,
        n: c_int,
        destructor: isize,
    ) -> c_int;
    fn sqlite3_bind_blob(
        stmt: *mut sqlite3_stmt,
        index: c_int,
        value: *const c_void,
        n: c_int,
        destructor: isize,
    ) -> c_int;
    fn sqlite3_bind_parameter_count(stmt: *mut sqlite3_stmt) -> c_int;
    fn sqlite3_bind_parameter_index(stmt: *mut sqlite3_stmt, name: *const c_char) -> c_int;

    // Column reading
    fn sqlite3_column_count(stmt: *mut sqlite3_stmt) -> c_int;
    fn sqlite3_column_type(stmt: *mut sqlite3_stmt, i_col: c_int) -> c_int;
    fn sqlite3_column_int64(stmt: *mut sqlite3_stmt, i_col: c_int) -> i64;
    fn sqlite3_column_double(stmt: *mut sqlite3_stmt, i_col: c_int) -> f64;
    fn sqlite3_column_text(stmt: *mut sqlite3_stmt, i_col: c_int) -> *const c_uchar;
    fn sqlite3_column_blob(stmt: *mut sqlite3_stmt, i_col: c_int) -> *const c_void;
    fn sqlite3_column_bytes(stmt: *mut sqlite3_stmt, i_col: c_int) -> c_int;
    fn sqlite3_column_name(stmt: *mut sqlite3_stmt, i_col: c_int) -> *const c_char;

    // Error reporting
    fn sqlite3_errmsg(db: *mut sqlite3) -> *const c_char;
    fn sqlite3_errcode(db: *mut sqlite3) -> c_int;
    fn sqlite3_errstr(code: c_int) -> *const c_char;

    // Connection state
    fn sqlite3_changes(db: *mut sqlite3) -> c_int;
    fn sqlite3_last_insert_rowid(db: *mut sqlite3) -> i64;
    fn sqlite3_get_autocommit(db: *mut sqlite3) -> c_int;
    fn sqlite3_db_filename(db: *mut sqlite3, z_db_name: *const c_char) -> *const c_char;
    fn sqlite3_update_hook(
        db: *mut sqlite3,
        callback: Option<UpdateHookCallback>,
        arg: *mut c_void,
    ) -> *mut c_void;

    // Snapshots and backups
    fn sqlite3_serialize(
        db: *mut sqlite3,
        z_schema: *const c_char,
        pi_size: *mut i64,
        m_flags: u32,
    ) -> *mut c_uchar;
    fn sqlite3_deserialize(
        db: *mut sqlite3,
        z_schema: *const c_char,
        p_data: *mut c_uchar,
        sz_db: i64,
        sz_buf: i64,
        m_flags: u32,
    ) -> c_int;
    fn sqlite3_backup_init(
        p_dest: *mut sqlite3,
        z_dest_name: *const c_char,
        p_source: *mut sqlite3,
        z_source_name: *const c_char,
    ) -> *mut sqlite3_backup;
    fn sqlite3_backup_step(p: *mut sqlite3_backup, n_page: c_int) -> c_int;
    fn sqlite3_backup_finish(p: *mut sqlite3_backup) -> c_int;

    // Session extension
    fn sqlite3session_create(
        db: *mut sqlite3,
        z_db: *const c_char,
        pp_session: *mut *mut sqlite3_session,
    ) -> c_int;
    fn sqlite3session_delete(session: *mut sqlite3_session);
    fn sqlite3session_enable(session: *mut sqlite3_session, enable: c_int) -> c_int;
    fn sqlite3session_attach(session: *mut sqlite3_session, z_tab: *const c_char) -> c_int;
    fn sqlite3session_changeset(
        session: *mut sqlite3_session,
        pn_changeset: *mut c_int,
        pp_changeset: *mut *mut c_void,
    ) -> c_int;
    fn sqlite3changeset_invert(
        n_in: c_int,
        p_in: *const c_void,
        pn_out: *mut c_int,
        pp_out: *mut *mut c_void,
    ) -> c_int;
    fn sqlite3changeset_apply(
        db: *mut sqlite3,
        n_changeset: c_int,
        p_changeset: *mut c_void,
        x_filter: Option<ChangesetFilter>,
        x_conflict: Option<ChangesetConflict>,
        p_ctx: *mut c_void,
    ) -> c_int;
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn cstring(value: &str) -> DbResult<CString> {
    CString::new(value)
        .map_err(|_| DbError::new(SQLITE_MISUSE, "string contains an interior NUL byte"))
}

fn length(len: usize) -> DbResult<c_int> {
    c_int::try_from(len).map_err(|_| DbError::new(SQLITE_TOOBIG, "value is too large"))
}

/// Copies a NUL-terminated C string owned by SQLite.
///
/// # Safety
///
/// `ptr` must be null or point to a valid NUL-terminated string.
unsafe fn owned_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// Copies a buffer allocated by SQLite and releases it.
///
/// # Safety
///
/// `ptr` must be null or a buffer of at least `len` bytes obtained from
/// `sqlite3_malloc`.
unsafe fn take_buffer(ptr: *mut c_void, len: c_int) -> Vec<u8> {
    let bytes = match usize::try_from(len) {
        Ok(len) if !ptr.is_null() && len > 0 => {
            std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec()
        }
        _ => Vec::new(),
    };
    sqlite3_free(ptr);
    bytes
}

/// English description of a result code.
pub fn error_string(code: c_int) -> String {
    unsafe { owned_str(sqlite3_errstr(code)) }.unwrap_or_else(|| "unknown error".to_string())
}

// ── Connection ──────────────────────────────────────────────────────────

/// A row change reported by the update hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUpdate {
    pub action_code: c_int,
    pub database_name: String,
    pub database_file_path: String,
    pub table_name: String,
    pub row_id: i64,
}

struct HookSlot {
    db: *mut sqlite3,
    callback: Box<dyn FnMut(RawUpdate)>,
}

unsafe extern "C" fn update_hook_trampoline(
    ctx: *mut c_void,
    action_code: c_int,
    db_name: *const c_char,
    table_name: *const c_char,
    row_id: i64,
) {
    let slot = &mut *ctx.cast::<HookSlot>();
    let database_file_path = if db_name.is_null() {
        String::new()
    } else {
        owned_str(sqlite3_db_filename(slot.db, db_name)).unwrap_or_default()
    };
    let update = RawUpdate {
        action_code,
        database_name: owned_str(db_name).unwrap_or_else(|| "main".to_string()),
        database_file_path,
        table_name: owned_str(table_name).unwrap_or_default(),
        row_id,
    };
    (slot.callback)(update);
}

unsafe extern "C" fn resolve_conflict(
    _ctx: *mut c_void,
    conflict: c_int,
    _iter: *mut sqlite3_changeset_iter,
) -> c_int {
    match conflict {
        SQLITE_CHANGESET_DATA | SQLITE_CHANGESET_CONFLICT => SQLITE_CHANGESET_REPLACE,
        _ => SQLITE_CHANGESET_OMIT,
    }
}

/// Owned `sqlite3*` handle. Closed with `sqlite3_close_v2` on drop, so the
/// handle stays valid until every statement prepared on it is finalized.
pub struct RawDb {
    ptr: *mut sqlite3,
    update_hook: RefCell<Option<Box<HookSlot>>>,
}

impl RawDb {
    pub fn open(path: &str, flags: c_int, vfs: Option<&str>) -> DbResult<Self> {
        let c_path = cstring(path)?;
        let c_vfs = vfs.map(cstring).transpose()?;
        let mut db: *mut sqlite3 = ptr::null_mut();
        let rc = unsafe {
            sqlite3_open_v2(
                c_path.as_ptr(),
                &mut db,
                flags,
                c_vfs.as_ref().map_or(ptr::null(), |vfs| vfs.as_ptr()),
            )
        };
        if rc != SQLITE_OK {
            if db.is_null() {
                return Err(DbError::new(rc, error_string(rc)));
            }
            let err = DbError::new(rc, unsafe { errmsg(db) });
            unsafe {
                sqlite3_close_v2(db);
            }
            return Err(err);
        }
        Ok(Self {
            ptr: db,
            update_hook: RefCell::new(None),
        })
    }

    pub fn exec(&self, sql: &str) -> DbResult<()> {
        let c_sql = cstring(sql)?;
        let mut message: *mut c_char = ptr::null_mut();
        let rc = unsafe {
            sqlite3_exec(self.ptr, c_sql.as_ptr(), None, ptr::null_mut(), &mut message)
        };
        if rc != SQLITE_OK {
            let text = unsafe {
                let text = owned_str(message);
                sqlite3_free(message.cast());
                text
            };
            return Err(DbError::new(rc, text.unwrap_or_else(|| self.errmsg())));
        }
        Ok(())
    }

    /// Compiles the first statement of `sql`; the tail is ignored.
    ///
    /// Returns `Ok(None)` when `sql` holds no statement (whitespace or comments).
    pub fn prepare(&self, sql: &str) -> DbResult<Option<RawStmt>> {
        let len = length(sql.len())?;
        let mut stmt: *mut sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        let rc = unsafe {
            sqlite3_prepare_v2(self.ptr, sql.as_ptr().cast(), len, &mut stmt, &mut tail)
        };
        if rc != SQLITE_OK {
            return Err(self.error(rc));
        }
        if stmt.is_null() {
            return Ok(None);
        }
        Ok(Some(RawStmt { ptr: stmt, db: self.ptr }))
    }

    pub fn changes(&self) -> i64 {
        i64::from(unsafe { sqlite3_changes(self.ptr) })
    }

    pub fn last_insert_rowid(&self) -> i64 {
        unsafe { sqlite3_last_insert_rowid(self.ptr) }
    }

    pub fn autocommit(&self) -> bool {
        unsafe { sqlite3_get_autocommit(self.ptr) != 0 }
    }

    pub fn filename(&self, schema: &str) -> DbResult<Option<String>> {
        let c_schema = cstring(schema)?;
        Ok(unsafe { owned_str(sqlite3_db_filename(self.ptr, c_schema.as_ptr())) }
            .filter(|name| !name.is_empty()))
    }

    /// Addresses of every statement currently prepared on this connection,
    /// walked with `sqlite3_next_stmt`.
    pub fn statement_addresses(&self) -> Vec<usize> {
        let mut addresses = Vec::new();
        let mut stmt = unsafe { sqlite3_next_stmt(self.ptr, ptr::null_mut()) };
        while !stmt.is_null() {
            addresses.push(stmt as usize);
            stmt = unsafe { sqlite3_next_stmt(self.ptr, stmt) };
        }
        addresses
    }

    pub fn set_update_hook(&self, callback: Option<Box<dyn FnMut(RawUpdate)>>) {
        let mut slot = self.update_hook.borrow_mut();
        unsafe {
            sqlite3_update_hook(self.ptr, None, ptr::null_mut());
        }
        *slot = None;
        if let Some(callback) = callback {
            let mut hook = Box::new(HookSlot {
                db: self.ptr,
                callback,
            });
            let ctx: *mut HookSlot = &mut *hook;
            unsafe {
                sqlite3_update_hook(self.ptr, Some(update_hook_trampoline), ctx.cast());
            }
            *slot = Some(hook);
        }
    }

    pub fn serialize(&self, schema: &str) -> DbResult<Vec<u8>> {
        let c_schema = cstring(schema)?;
        let mut size: i64 = -1;
        let data = unsafe { sqlite3_serialize(self.ptr, c_schema.as_ptr(), &mut size, 0) };
        if data.is_null() {
            // An empty database serializes to zero pages and no buffer.
            if size == 0 {
                return Ok(Vec::new());
            }
            return Err(DbError::new(
                SQLITE_ERROR,
                format!("unable to serialize schema '{schema}'"),
            ));
        }
        let len = usize::try_from(size).unwrap_or(0);
        let bytes = unsafe {
            let bytes = std::slice::from_raw_parts(data, len).to_vec();
            sqlite3_free(data.cast());
            bytes
        };
        Ok(bytes)
    }

    pub fn deserialize(&self, schema: &str, data: &[u8]) -> DbResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let c_schema = cstring(schema)?;
        let size = i64::try_from(data.len())
            .map_err(|_| DbError::new(SQLITE_TOOBIG, "snapshot is too large"))?;
        let rc = unsafe {
            let buffer = sqlite3_malloc64(data.len() as u64).cast::<c_uchar>();
            if buffer.is_null() {
                return Err(DbError::new(SQLITE_NOMEM, error_string(SQLITE_NOMEM)));
            }
            ptr::copy_nonoverlapping(data.as_ptr(), buffer, data.len());
            // With FREEONCLOSE SQLite owns the buffer from here on, even on failure.
            sqlite3_deserialize(
                self.ptr,
                c_schema.as_ptr(),
                buffer,
                size,
                size,
                SQLITE_DESERIALIZE_FREEONCLOSE | SQLITE_DESERIALIZE_RESIZEABLE,
            )
        };
        self.check(rc)
    }

    pub fn create_session(&self, db_name: &str) -> DbResult<RawSession> {
        let c_name = cstring(db_name)?;
        let mut session: *mut sqlite3_session = ptr::null_mut();
        let rc = unsafe { sqlite3session_create(self.ptr, c_name.as_ptr(), &mut session) };
        if rc != SQLITE_OK || session.is_null() {
            return Err(self.error(rc));
        }
        Ok(RawSession { ptr: session })
    }

    pub fn apply_changeset(&self, changeset: &[u8]) -> DbResult<()> {
        let len = length(changeset.len())?;
        let mut buffer = changeset.to_vec();
        let rc = unsafe {
            sqlite3changeset_apply(
                self.ptr,
                len,
                buffer.as_mut_ptr().cast(),
                None,
                Some(resolve_conflict),
                ptr::null_mut(),
            )
        };
        self.check(rc)
    }

    fn errmsg(&self) -> String {
        unsafe { errmsg(self.ptr) }
    }

    fn error(&self, code: c_int) -> DbError {
        DbError::new(code, self.errmsg())
    }

    fn check(&self, code: c_int) -> DbResult<()> {
        if code == SQLITE_OK {
            Ok(())
        } else {
            Err(self.error(code))
        }
    }
}

impl Drop for RawDb {
    fn drop(&mut self) {
        unsafe {
            sqlite3_update_hook(self.ptr, None, ptr::null_mut());
            sqlite3_close_v2(self.ptr);
        }
    }
}

/// Reads `sqlite3_errmsg` for `db`.
///
/// # Safety
///
/// `db` must be a live (possibly zombie) connection handle.
unsafe fn errmsg(db: *mut sqlite3) -> String {
    owned_str(sqlite3_errmsg(db)).unwrap_or_else(|| "unknown error".to_string())
}

/// Copies every page of `source_name` on `source` into `dest_name` on `dest`.
pub fn backup(dest: &RawDb, dest_name: &str, source: &RawDb, source_name: &str) -> DbResult<()> {
    let c_dest = cstring(dest_name)?;
    let c_source = cstring(source_name)?;
    unsafe {
        let handle =
            sqlite3_backup_init(dest.ptr, c_dest.as_ptr(), source.ptr, c_source.as_ptr());
        if handle.is_null() {
            return Err(dest.error(sqlite3_errcode(dest.ptr)));
        }
        sqlite3_backup_step(handle, -1);
        let rc = sqlite3_backup_finish(handle);
        dest.check(rc)
    }
}

/// Produces the inverse of `changeset`.
pub fn invert_changeset(changeset: &[u8]) -> DbResult<Vec<u8>> {
    let len = length(changeset.len())?;
    let mut out_len: c_int = 0;
    let mut out: *mut c_void = ptr::null_mut();
    let rc = unsafe {
        sqlite3changeset_invert(len, changeset.as_ptr().cast(), &mut out_len, &mut out)
    };
    if rc != SQLITE_OK {
        unsafe { sqlite3_free(out) };
        return Err(DbError::new(rc, error_string(rc)));
    }
    Ok(unsafe { take_buffer(out, out_len) })
}

// ── Statement ───────────────────────────────────────────────────────────

/// Owned `sqlite3_stmt*`. Finalized on drop unless finalized explicitly.
pub struct RawStmt {
    ptr: *mut sqlite3_stmt,
    db: *mut sqlite3,
}

impl RawStmt {
    pub fn address(&self) -> usize {
        self.ptr as usize
    }

    /// Returns `SQLITE_ROW` or `SQLITE_DONE`; any other code is an error.
    pub fn step(&self) -> DbResult<c_int> {
        let rc = unsafe { sqlite3_step(self.ptr) };
        match rc {
            SQLITE_ROW | SQLITE_DONE => Ok(rc),
            _ => Err(self.error(rc)),
        }
    }

    pub fn reset(&self) -> DbResult<()> {
        let rc = unsafe { sqlite3_reset(self.ptr) };
        self.check(rc)
    }

    pub fn clear_bindings(&self) -> DbResult<()> {
        let rc = unsafe { sqlite3_clear_bindings(self.ptr) };
        self.check(rc)
    }

    pub fn finalize(mut self) -> DbResult<()> {
        let rc = unsafe { sqlite3_finalize(self.ptr) };
        self.ptr = ptr::null_mut();
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(DbError::new(rc, unsafe { errmsg(self.db) }))
        }
    }

    pub fn bind_null(&self, index: c_int) -> DbResult<()> {
        let rc = unsafe { sqlite3_bind_null(self.ptr, index) };
        self.check(rc)
    }

    pub fn bind_int(&self, index: c_int, value: i32) -> DbResult<()> {
        let rc = unsafe { sqlite3_bind_int(self.ptr, index, value) };
        self.check(rc)
    }

    pub fn bind_int64(&self, index: c_int, value: i64) -> DbResult<()> {
        let rc = unsafe { sqlite3_bind_int64(self.ptr, index, value) };
        self.check(rc)
    }

    pub fn bind_double(&self, index: c_int, value: f64) -> DbResult<()> {
        let rc = unsafe { sqlite3_bind_double(self.ptr, index, value) };
        self.check(rc)
    }

    pub fn bind_text(&self, index: c_int, value: &str) -> DbResult<()> {
        let len = length(value.len())?;
        let rc = unsafe {
            sqlite3_bind_text(self.ptr, index, value.as_ptr().cast(), len, SQLITE_TRANSIENT)
        };
        self.check(rc)
    }

    pub fn bind_blob(&self, index: c_int, value: &[u8]) -> DbResult<()> {
        let len = length(value.len())?;
        let rc = unsafe {
            sqlite3_bind_blob(self.ptr, index, value.as_ptr().cast(), len, SQLITE_TRANSIENT)
        };
        self.check(rc)
    }

    pub fn bind_parameter_count(&self) -> c_int {
        unsafe { sqlite3_bind_parameter_count(self.ptr) }
    }

    /// Returns 0 when no parameter has that name.
    pub fn bind_parameter_index(&self, name: &str) -> DbResult<c_int> {
        let c_name = cstring(name)?;
        Ok(unsafe { sqlite3_bind_parameter_index(self.ptr, c_name.as_ptr()) })
    }

    pub fn column_count(&self) -> c_int {
        unsafe { sqlite3_column_count(self.ptr) }
    }

    pub fn column_type(&self, index: c_int) -> c_int {
        unsafe { sqlite3_column_type(self.ptr, index) }
    }

    pub fn column_int64(&self, index: c_int) -> i64 {
        unsafe { sqlite3_column_int64(self.ptr, index) }
    }

    pub fn column_double(&self, index: c_int) -> f64 {
        unsafe { sqlite3_column_double(self.ptr, index) }
    }

    pub fn column_text(&self, index: c_int) -> String {
        unsafe {
            let ptr = sqlite3_column_text(self.ptr, index);
            let len = sqlite3_column_bytes(self.ptr, index);
            match usize::try_from(len) {
                Ok(len) if !ptr.is_null() && len > 0 => {
                    String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).into_owned()
                }
                _ => String::new(),
            }
        }
    }

    pub fn column_blob(&self, index: c_int) -> Vec<u8> {
        unsafe {
            let ptr = sqlite3_column_blob(self.ptr, index);
            let len = sqlite3_column_bytes(self.ptr, index);
            match usize::try_from(len) {
                Ok(len) if !ptr.is_null() && len > 0 => {
                    std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec()
                }
                _ => Vec::new(),
            }
        }
    }

    pub fn column_name(&self, index: c_int) -> Option<String> {
        unsafe { owned_str(sqlite3_column_name(self.ptr, index)) }
    }

    fn error(&self, code: c_int) -> DbError {
        DbError::new(code, unsafe { errmsg(self.db) })
    }

    fn check(&self, code: c_int) -> DbResult<()> {
        if code == SQLITE_OK {
            Ok(())
        } else {
            Err(self.error(code))
        }
    }
}

impl Drop for RawStmt {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                sqlite3_finalize(self.ptr);
            }
            self.ptr = ptr::null_mut();
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────────

/// Owned `sqlite3_session*`. Deleted on drop.
pub struct RawSession {
    ptr: *mut sqlite3_session,
}

impl RawSession {
    /// `None` attaches every table of the schema.
    pub fn attach(&self, table: Option<&str>) -> DbResult<()> {
        let c_table = table.map(cstring).transpose()?;
        let rc = unsafe {
            sqlite3session_attach(
                self.ptr,
                c_table.as_ref().map_or(ptr::null(), |table| table.as_ptr()),
            )
        };
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(DbError::new(rc, error_string(rc)))
        }
    }

    /// Returns the recording state after the call.
    pub fn enable(&self, enabled: bool) -> bool {
        unsafe { sqlite3session_enable(self.ptr, c_int::from(enabled)) != 0 }
    }

    pub fn changeset(&self) -> DbResult<Vec<u8>> {
        let mut len: c_int = 0;
        let mut data: *mut c_void = ptr::null_mut();
        let rc = unsafe { sqlite3session_changeset(self.ptr, &mut len, &mut data) };
        if rc != SQLITE_OK {
            unsafe { sqlite3_free(data) };
            return Err(DbError::new(rc, error_string(rc)));
        }
        Ok(unsafe { take_buffer(data, len) })
    }
}

impl Drop for RawSession {
    fn drop(&mut self) {
        unsafe {
            sqlite3session_delete(self.ptr);
        }
    }
}
