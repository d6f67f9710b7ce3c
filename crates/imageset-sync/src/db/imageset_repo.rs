//! Image set repository: CRUD over the `cluster_image_sets` table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::imageset::{ClusterImageSet, ClusterImageSetSpec, ObjectMeta};
use crate::store::{ImageSetStore, StoreError};

/// A raw image set row from the database.
#[derive(Debug, Clone)]
struct ImageSetRow {
    name: String,
    uid: String,
    resource_version: i64,
    api_version: String,
    kind: String,
    release_image: String,
    labels: String,
    annotations: String,
    created_at: String,
}

impl ImageSetRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            name: row.get("name")?,
            uid: row.get("uid")?,
            resource_version: row.get("resource_version")?,
            api_version: row.get("api_version")?,
            kind: row.get("kind")?,
            release_image: row.get("release_image")?,
            labels: row.get("labels")?,
            annotations: row.get("annotations")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_imageset(self) -> Result<ClusterImageSet, DatabaseError> {
        let labels: BTreeMap<String, String> = serde_json::from_str(&self.labels)
            .map_err(|source| DatabaseError::Json {
                column: "labels",
                source,
            })?;
        let annotations: BTreeMap<String, String> = serde_json::from_str(&self.annotations)
            .map_err(|source| DatabaseError::Json {
                column: "annotations",
                source,
            })?;
        let creation_timestamp = DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|ts| ts.with_timezone(&Utc));

        Ok(ClusterImageSet {
            api_version: self.api_version,
            kind: self.kind,
            metadata: ObjectMeta {
                name: self.name,
                labels,
                annotations,
                uid: Some(self.uid),
                resource_version: Some(self.resource_version.max(0) as u64),
                creation_timestamp,
            },
            spec: ClusterImageSetSpec {
                release_image: self.release_image,
            },
        })
    }
}

fn encode_map(
    column: &'static str,
    map: &BTreeMap<String, String>,
) -> Result<String, DatabaseError> {
    serde_json::to_string(map).map_err(|source| DatabaseError::Json { column, source })
}

fn find_row(conn: &Connection, name: &str) -> Result<Option<ImageSetRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM cluster_image_sets WHERE name = ?1",
            params![name],
            ImageSetRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Result of a write attempted under the connection lock.
enum WriteOutcome {
    Done(ClusterImageSet),
    Rejected(StoreError),
}

/// [`ImageSetStore`] backed by SQLite.
#[derive(Clone)]
pub struct SqliteImageSetStore {
    db: Database,
}

impl SqliteImageSetStore {
    /// Wraps an opened database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    fn finish(result: Result<WriteOutcome, DatabaseError>) -> Result<ClusterImageSet, StoreError> {
        match result? {
            WriteOutcome::Done(record) => Ok(record),
            WriteOutcome::Rejected(err) => Err(err),
        }
    }
}

impl ImageSetStore for SqliteImageSetStore {
    fn get(&self, name: &str) -> Result<Option<ClusterImageSet>, StoreError> {
        let record = self.db.with_conn(|conn| {
            find_row(conn, name)?
                .map(ImageSetRow::into_imageset)
                .transpose()
        })?;
        Ok(record)
    }

    fn create(&self, imageset: &ClusterImageSet) -> Result<ClusterImageSet, StoreError> {
        let result = self.db.with_conn(|conn| {
            if find_row(conn, imageset.name())?.is_some() {
                return Ok(WriteOutcome::Rejected(StoreError::AlreadyExists(
                    imageset.name().to_string(),
                )));
            }

            let mut record = imageset.clone();
            let now = Utc::now();
            record.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
            record.metadata.resource_version = Some(1);
            record.metadata.creation_timestamp = Some(now);

            conn.execute(
                "INSERT INTO cluster_image_sets (name, uid, resource_version, api_version,
                 kind, release_image, labels, annotations, created_at)
                 VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.metadata.name,
                    record.metadata.uid,
                    record.api_version,
                    record.kind,
                    record.spec.release_image,
                    encode_map("labels", &record.metadata.labels)?,
                    encode_map("annotations", &record.metadata.annotations)?,
                    now.to_rfc3339(),
                ],
            )?;

            Ok(WriteOutcome::Done(record))
        });
        Self::finish(result)
    }

    fn update(
        &self,
        name: &str,
        imageset: &ClusterImageSet,
    ) -> Result<ClusterImageSet, StoreError> {
        let result = self.db.with_conn(|conn| {
            let Some(existing) = find_row(conn, name)? else {
                return Ok(WriteOutcome::Rejected(StoreError::NotFound(name.to_string())));
            };

            let current = existing.resource_version.max(0) as u64;
            if let Some(expected) = imageset.metadata.resource_version {
                if expected != current {
                    return Ok(WriteOutcome::Rejected(StoreError::Conflict {
                        name: name.to_string(),
                        expected,
                        actual: current,
                    }));
                }
            }

            let next = current + 1;
            conn.execute(
                "UPDATE cluster_image_sets SET resource_version=?2, api_version=?3, kind=?4,
                 release_image=?5, labels=?6, annotations=?7
                 WHERE name=?1",
                params![
                    name,
                    next as i64,
                    imageset.api_version,
                    imageset.kind,
                    imageset.spec.release_image,
                    encode_map("labels", &imageset.metadata.labels)?,
                    encode_map("annotations", &imageset.metadata.annotations)?,
                ],
            )?;

            let mut record = imageset.clone();
            record.metadata.name = name.to_string();
            record.metadata.uid = Some(existing.uid.clone());
            record.metadata.resource_version = Some(next);
            record.metadata.creation_timestamp = DateTime::parse_from_rfc3339(&existing.created_at)
                .ok()
                .map(|ts| ts.with_timezone(&Utc));
            Ok(WriteOutcome::Done(record))
        });
        Self::finish(result)
    }

    fn list(&self) -> Result<Vec<ClusterImageSet>, StoreError> {
        let records: Vec<ClusterImageSet> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM cluster_image_sets ORDER BY name")?;
            let rows = stmt
                .query_map([], ImageSetRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(ImageSetRow::into_imageset).collect()
        })?;
        Ok(records)
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        let affected = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM cluster_image_sets WHERE name = ?1",
                params![name],
            )?)
        })?;
        if affected == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imageset::{CHANNEL_LABEL, VISIBLE_LABEL};

    fn store() -> SqliteImageSetStore {
        SqliteImageSetStore::new(Database::open_in_memory().unwrap())
    }

    fn sample(name: &str, release: &str) -> ClusterImageSet {
        ClusterImageSet::new(name, release)
            .with_label(CHANNEL_LABEL, "fast")
            .with_label(VISIBLE_LABEL, "true")
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let created = store.create(&sample("img4.11.0", "r:1")).unwrap();
        assert_eq!(created.metadata.resource_version, Some(1));

        let found = store.get("img4.11.0").unwrap().unwrap();
        assert_eq!(found.release_image(), "r:1");
        assert_eq!(found.channel(), Some("fast"));
        assert_eq!(found.metadata.uid, created.metadata.uid);
        assert!(found.metadata.creation_timestamp.is_some());
    }

    #[test]
    fn test_get_missing() {
        assert!(store().get("nope").unwrap().is_none());
    }

    #[test]
    fn test_create_duplicate() {
        let store = store();
        store.create(&sample("a", "r:1")).unwrap();
        let err = store.create(&sample("a", "r:1")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(name) if name == "a"));
    }

    #[test]
    fn test_update_overwrites_labels_and_bumps_version() {
        let store = store();
        let created = store.create(&sample("a", "r:1")).unwrap();

        let mut changed = created.clone();
        changed.merge_desired(&ClusterImageSet::new("a", "r:2").with_label(VISIBLE_LABEL, "false"));
        let updated = store.update("a", &changed).unwrap();
        assert_eq!(updated.metadata.resource_version, Some(2));

        let found = store.get("a").unwrap().unwrap();
        assert_eq!(found.release_image(), "r:2");
        assert_eq!(found.metadata.label(VISIBLE_LABEL), "false");
        assert_eq!(found.channel(), None);
        assert_eq!(found.metadata.uid, created.metadata.uid);
    }

    #[test]
    fn test_update_conflict() {
        let store = store();
        let created = store.create(&sample("a", "r:1")).unwrap();
        store.update("a", &created).unwrap();
        let err = store.update("a", &created).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, actual: 2, .. }));
    }

    #[test]
    fn test_update_missing() {
        let err = store().update("a", &sample("a", "r")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_sorted_and_delete() {
        let store = store();
        store.create(&sample("b", "r")).unwrap();
        store.create(&sample("a", "r")).unwrap();

        let names: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.metadata.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        store.delete("a").unwrap();
        assert!(store.delete("a").unwrap_err().is_not_found());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_labels_surface_as_backend_error() {
        let store = store();
        store.create(&sample("a", "r")).unwrap();
        store
            .database()
            .with_conn(|conn| {
                conn.execute("UPDATE cluster_image_sets SET labels = 'not json'", [])?;
                Ok(())
            })
            .unwrap();

        let err = store.get("a").unwrap_err();
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("labels")));
    }
}
