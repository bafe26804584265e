//! Reference lists used to fill search filters: languages and the fandom
//! index of each media category.
//!
//! Downloaded lists are kept as JSON files in a [`ResourceStore`] so they
//! only have to be fetched once.

use crate::errors::Ao3ApiError;
use crate::extraction::resource::{ResourceEntry, parse_fandoms, parse_languages};
use crate::lazy::ThreadHandle;
use crate::session::Session;
use crate::Result;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const LANGUAGES: &str = "languages";

/// Fandom resources and the media key each is listed under.
const FANDOM_CATEGORIES: [(&str, &str); 11] = [
    ("anime_manga_fandoms", "Anime%20*a*%20Manga"),
    ("books_literature_fandoms", "Books%20*a*%20Literature"),
    (
        "cartoons_comics_graphicnovels_fandoms",
        "Cartoons%20*a*%20Comics%20*a*%20Graphic%20Novels",
    ),
    (
        "celebrities_real_people_fandoms",
        "Celebrities%20*a*%20Real%20People",
    ),
    ("movies_fandoms", "Movies"),
    ("music_bands_fandoms", "Music%20*a*%20Bands"),
    ("other_media_fandoms", "Other%20Media"),
    ("theater_fandoms", "Theater"),
    ("tvshows_fandoms", "TV%20Shows"),
    ("videogames_fandoms", "Video%20Games"),
    ("uncategorized_fandoms", "Uncategorized%20Fandoms"),
];

/// Every resource name, grouped as `"fandoms"` and `"languages"`.
pub fn available_resources() -> BTreeMap<&'static str, Vec<&'static str>> {
    let mut groups = BTreeMap::new();
    groups.insert(
        "fandoms",
        FANDOM_CATEGORIES.iter().map(|(name, _)| *name).collect(),
    );
    groups.insert("languages", vec![LANGUAGES]);
    groups
}

fn is_known(name: &str) -> bool {
    name == LANGUAGES || FANDOM_CATEGORIES.iter().any(|(n, _)| *n == name)
}

fn resource_path(name: &str) -> Result<String> {
    if name == LANGUAGES {
        return Ok("/languages".to_string());
    }
    FANDOM_CATEGORIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, key)| format!("/media/{key}/fandoms"))
        .ok_or_else(|| Ao3ApiError::invalid_argument(format!("unknown resource {name}")))
}

/// Fetches and parses one resource.
pub fn download_resource(session: &Session, name: &str) -> Result<Vec<ResourceEntry>> {
    let path = resource_path(name)?;
    let body = session.get(&path)?;
    let entries = if name == LANGUAGES {
        parse_languages(&body)?
    } else {
        parse_fandoms(&body)?
    };
    info!("downloaded resource {name}: {} entries", entries.len());
    Ok(entries)
}

/// A directory of downloaded resources, one `<name>.json` per resource.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    dir: PathBuf,
}

impl ResourceStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, name: &str) -> Result<PathBuf> {
        if !is_known(name) {
            return Err(Ao3ApiError::invalid_argument(format!("unknown resource {name}")));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    pub fn has(&self, name: &str) -> bool {
        self.file(name).is_ok_and(|path| path.is_file())
    }

    pub fn save(&self, name: &str, entries: &[ResourceEntry]) -> Result<()> {
        let path = self.file(name)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, serde_json::to_vec_pretty(entries)?)?;
        debug!("saved {} to {}", name, path.display());
        Ok(())
    }

    /// A stored resource; `Unloaded` when it was never downloaded.
    pub fn load(&self, name: &str) -> Result<Vec<ResourceEntry>> {
        let path = self.file(name)?;
        if !path.is_file() {
            return Err(Ao3ApiError::unloaded(format!(
                "resource {name} has not been downloaded"
            )));
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Downloads every resource, skipping stored ones unless `redownload`.
    pub fn download_all(&self, session: &Session, redownload: bool) -> Result<()> {
        for name in all_names() {
            if !redownload && self.has(name) {
                debug!("resource {name} already stored");
                continue;
            }
            let entries = download_resource(session, name)?;
            self.save(name, &entries)?;
        }
        Ok(())
    }

    /// Like [`ResourceStore::download_all`], one worker thread per resource.
    ///
    /// Every worker runs to completion; the first error is returned.
    pub fn download_all_threaded(&self, session: &Session, redownload: bool) -> Result<()> {
        let handles: Vec<(&str, ThreadHandle<()>)> = all_names()
            .filter(|name| redownload || !self.has(name))
            .map(|name| {
                let store = self.clone();
                let session = session.clone();
                let handle = ThreadHandle::spawn(move || {
                    let entries = download_resource(&session, name)?;
                    store.save(name, &entries)
                });
                (name, handle)
            })
            .collect();

        let mut first_error = None;
        for (name, handle) in handles {
            if let Err(err) = handle.wait() {
                warn!("failed to download resource {name}: {err}");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stored fandoms whose name contains `query`, ignoring case.
    pub fn search_fandom(&self, query: &str) -> Result<Vec<String>> {
        let needle = query.to_lowercase();
        let mut found = Vec::new();
        let mut any_stored = false;
        for (name, _) in FANDOM_CATEGORIES {
            if !self.has(name) {
                continue;
            }
            any_stored = true;
            found.extend(
                self.load(name)?
                    .into_iter()
                    .map(|entry| entry.name)
                    .filter(|fandom| fandom.to_lowercase().contains(&needle)),
            );
        }
        if !any_stored {
            return Err(Ao3ApiError::unloaded(
                "no fandom resources downloaded; call download_all() first",
            ));
        }
        Ok(found)
    }
}

fn all_names() -> impl Iterator<Item = &'static str> {
    FANDOM_CATEGORIES
        .iter()
        .map(|(name, _)| *name)
        .chain(std::iter::once(LANGUAGES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn groups_list_every_resource() {
        let groups = available_resources();
        assert_eq!(groups["fandoms"].len(), 11);
        assert_eq!(groups["languages"], vec!["languages"]);
        assert_eq!(
            resource_path("movies_fandoms").unwrap(),
            "/media/Movies/fandoms"
        );
        assert!(resource_path("poetry_fandoms").is_err());
    }

    #[test]
    fn store_round_trips_and_searches() {
        let scratch = tempdir().unwrap();
        let store = ResourceStore::new(scratch.path().join("resources"));
        assert!(matches!(
            store.search_fandom("trek"),
            Err(Ao3ApiError::Unloaded(_))
        ));
        let fandoms = vec![
            ResourceEntry {
                name: "Star Trek".into(),
                alias: None,
            },
            ResourceEntry {
                name: "Stargate SG-1".into(),
                alias: None,
            },
        ];
        store.save("tvshows_fandoms", &fandoms).unwrap();
        assert!(store.has("tvshows_fandoms"));
        assert!(!store.has("movies_fandoms"));
        assert_eq!(store.load("tvshows_fandoms").unwrap(), fandoms);
        assert_eq!(store.search_fandom("TREK").unwrap(), vec!["Star Trek"]);
        assert!(store.save("nope", &fandoms).is_err());
    }
}
