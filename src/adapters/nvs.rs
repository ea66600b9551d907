//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] for the [`ConfigStore`](crate::store::ConfigStore).
//!
//! - Namespace and key names are limited to 15 bytes by NVS; longer names
//!   are truncated here.  The store's keys stay unique after truncation.
//! - `write_batch` sets every blob through one handle and commits once.
//!   NVS persists each blob as it is set, so a failure partway through is
//!   undone by restoring the keys already touched to their prior values.
//! - The simulation backend is a plain in-memory map (dev/test only).

use crate::app::ports::{StorageError, StoragePort};
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// NVS name limit (excluding NUL).
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const NVS_NAME_MAX: usize = 15;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Vec<u8>>,
    /// Simulation: the next batch fails when it reaches this entry.
    #[cfg(not(target_os = "espidf"))]
    fail_batch_at: Option<usize>,
}

/// Per-key access used by [`apply_batch`], one implementation per backend.
trait BlobSlots {
    type Err;
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, Self::Err>;
    fn set(&mut self, key: &str, data: &[u8]) -> Result<(), Self::Err>;
    fn erase(&mut self, key: &str) -> Result<(), Self::Err>;
}

/// Set every entry.  On the first failure the keys already set are put
/// back the way they were, newest first, and the error is returned.  A
/// restore that fails itself is logged; the batch is then only partially
/// undone.
fn apply_batch<S: BlobSlots>(slots: &mut S, entries: &[(&str, &[u8])]) -> Result<(), S::Err> {
    let mut prior = Vec::with_capacity(entries.len());
    for (key, _) in entries {
        prior.push(slots.get(key)?);
    }

    for (done, (key, data)) in entries.iter().enumerate() {
        let Err(e) = slots.set(key, data) else {
            continue;
        };
        warn!("NvsAdapter: batch failed at '{}', restoring {} keys", key, done);
        for ((key, _), old) in entries[..done].iter().zip(&prior).rev() {
            let restored = match old {
                Some(old) => slots.set(key, old),
                None => slots.erase(key),
            };
            if restored.is_err() {
                warn!("NvsAdapter: could not restore '{}'", key);
            }
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
struct SimSlots<'a> {
    store: &'a mut HashMap<String, Vec<u8>>,
    namespace: &'a str,
    fail_at: Option<usize>,
    sets: usize,
}

#[cfg(not(target_os = "espidf"))]
impl BlobSlots for SimSlots<'_> {
    type Err = StorageError;

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.store.get(&NvsAdapter::composite_key(self.namespace, key)).cloned())
    }

    fn set(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let sets = self.sets;
        if self.fail_at.take_if(|at| *at == sets).is_some() {
            return Err(StorageError::Full);
        }
        self.sets += 1;
        self.store
            .insert(NvsAdapter::composite_key(self.namespace, key), data.to_vec());
        Ok(())
    }

    fn erase(&mut self, key: &str) -> Result<(), StorageError> {
        self.store.remove(&NvsAdapter::composite_key(self.namespace, key));
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
struct HandleSlots(nvs_handle_t);

#[cfg(target_os = "espidf")]
impl BlobSlots for HandleSlots {
    type Err = i32;

    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, i32> {
        let key_buf = NvsAdapter::c_name(key);
        let mut size = 0usize;
        // Size query first, then the read itself.
        let ret = unsafe {
            nvs_get_blob(self.0, key_buf.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
        };
        if ret == ESP_ERR_NVS_NOT_FOUND {
            return Ok(None);
        }
        if ret != ESP_OK {
            return Err(ret);
        }
        let mut data = vec![0u8; size];
        let ret = unsafe {
            nvs_get_blob(
                self.0,
                key_buf.as_ptr() as *const _,
                data.as_mut_ptr() as *mut _,
                &mut size,
            )
        };
        if ret != ESP_OK {
            return Err(ret);
        }
        data.truncate(size);
        Ok(Some(data))
    }

    fn set(&mut self, key: &str, data: &[u8]) -> Result<(), i32> {
        NvsAdapter::set_blob(self.0, key, data)
    }

    fn erase(&mut self, key: &str) -> Result<(), i32> {
        let key_buf = NvsAdapter::c_name(key);
        let ret = unsafe { nvs_erase_key(self.0, key_buf.as_ptr() as *const _) };
        if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
            return Err(ret);
        }
        Ok(())
    }
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
            #[cfg(not(target_os = "espidf"))]
            fail_batch_at: None,
        })
    }

    /// Simulation: make the next `write_batch` fail on entry `index`.
    #[cfg(not(target_os = "espidf"))]
    pub fn fail_next_batch_at(&mut self, index: usize) {
        self.fail_batch_at = Some(index);
    }

    /// Simulation: every stored key and value, sorted by key.
    #[cfg(not(target_os = "espidf"))]
    pub fn snapshot(&self) -> Vec<(String, Vec<u8>)> {
        let mut all: Vec<_> = self
            .store
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort();
        all
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated, truncated copy of an NVS name.
    #[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
    fn c_name(name: &str) -> [u8; NVS_NAME_MAX + 1] {
        let mut buf = [0u8; NVS_NAME_MAX + 1];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NVS_NAME_MAX);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns_buf = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn set_blob(handle: nvs_handle_t, key: &str, data: &[u8]) -> Result<(), i32> {
        let key_buf = Self::c_name(key);
        let ret = unsafe {
            nvs_set_blob(
                handle,
                key_buf.as_ptr() as *const _,
                data.as_ptr() as *const _,
                data.len(),
            )
        };
        if ret != ESP_OK {
            return Err(ret);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn commit(handle: nvs_handle_t) -> Result<(), i32> {
        let ret = unsafe { nvs_commit(handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn map_err(code: i32) -> StorageError {
        if code == ESP_ERR_NVS_NOT_FOUND {
            StorageError::NotFound
        } else if code == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
            StorageError::Full
        } else {
            warn!("NvsAdapter: NVS error {}", code);
            StorageError::IoError
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            Self::with_nvs_handle(namespace, false, |handle| {
                let key_buf = Self::c_name(key);
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            })
            .map_err(Self::map_err)
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            Self::with_nvs_handle(namespace, true, |handle| {
                Self::set_blob(handle, key, data)?;
                Self::commit(handle)
            })
            .map_err(Self::map_err)
        }
    }

    fn write_batch(
        &mut self,
        namespace: &str,
        entries: &[(&str, &[u8])],
    ) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let mut slots = SimSlots {
                store: &mut self.store,
                namespace,
                fail_at: self.fail_batch_at.take(),
                sets: 0,
            };
            apply_batch(&mut slots, entries)?;
            info!("NvsAdapter: {} keys saved (simulation)", entries.len());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            Self::with_nvs_handle(namespace, true, |handle| {
                let outcome = apply_batch(&mut HandleSlots(handle), entries);
                // Commit the restored keys too.
                let committed = Self::commit(handle);
                outcome.and(committed)
            })
            .map_err(Self::map_err)?;
            info!("NvsAdapter: {} keys committed to NVS", entries.len());
            Ok(())
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            Self::with_nvs_handle(namespace, true, |handle| {
                let key_buf = Self::c_name(key);
                let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                Self::commit(handle)
            })
            .map_err(Self::map_err)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            Self::with_nvs_handle(namespace, false, |handle| {
                let key_buf = Self::c_name(key);
                let ret = unsafe {
                    nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            })
            .unwrap_or(false)
        }
    }

    fn erase_namespace(&mut self, namespace: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let prefix = format!("{}::", namespace);
            self.store.retain(|k, _| !k.starts_with(&prefix));
            info!("NvsAdapter: namespace '{}' erased (simulation)", namespace);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_all(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Self::commit(handle)
            })
            .map_err(Self::map_err)?;
            info!("NvsAdapter: namespace '{}' erased", namespace);
            Ok(())
        }
    }
}
