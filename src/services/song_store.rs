//! Song persistence: CRUD, search, the derived artist view, and lyrics.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::lrc;
use crate::models::{
    Artist, ItunesIds, Lyrics, Page, SetLyricsRequest, Song, SongPatch, SongPaths, SongSource,
    SongStatus, Thumbnail,
};
use crate::search;

/// Sort order accepted by the listing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        match raw {
            None => Ok(SortDirection::Desc),
            Some("asc") => Ok(SortDirection::Asc),
            Some("desc") => Ok(SortDirection::Desc),
            Some(other) => Err(AppError::invalid(
                "direction",
                format!("unknown direction {:?}", other),
            )),
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Whitelisted sort columns; anything else is a validation error.
fn sort_column(raw: Option<&str>) -> Result<&'static str> {
    match raw.unwrap_or("date_added") {
        "date_added" | "dateAdded" => Ok("date_added"),
        "title" => Ok("title"),
        "artist" => Ok("artist_normalized"),
        "album" => Ok("album"),
        "year" => Ok("year"),
        "duration" => Ok("duration_ms"),
        "status" => Ok("status"),
        other => Err(AppError::invalid(
            "sort_by",
            format!("unknown sort field {:?}", other),
        )),
    }
}

/// Fields a completed enrichment writes back onto the song.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub itunes_ids: ItunesIds,
    pub genre: Option<String>,
    pub year: Option<i64>,
    pub language: Option<String>,
}

/// Options for paged song listings.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub offset: i64,
    pub limit: i64,
    pub sort_by: Option<String>,
    pub direction: Option<String>,
}

impl ListOptions {
    fn clamp(&self) -> (i64, i64) {
        let limit = if self.limit <= 0 {
            50
        } else {
            self.limit.min(500)
        };
        (self.offset.max(0), limit)
    }
}

pub struct SongStore {
    pool: SqlitePool,
}

impl SongStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new song row. A youtube song whose `video_id` already exists
    /// is a conflict; the caller decides whether to surface or dedup it.
    pub async fn create_song(
        &self,
        title: &str,
        artist: &str,
        album: Option<&str>,
        source: SongSource,
        source_url: Option<&str>,
        video_id: Option<&str>,
    ) -> Result<Song> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let normalized = search::normalize(artist);

        let inserted = sqlx::query(
            r#"INSERT INTO songs
               (id, title, artist, artist_normalized, album, source, source_url, video_id,
                status, paths, thumbnails, date_added, favorite)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', '{}', '[]', ?, 0)"#,
        )
        .bind(id)
        .bind(title)
        .bind(artist)
        .bind(&normalized)
        .bind(album)
        .bind(source.as_str())
        .bind(source_url)
        .bind(video_id)
        .bind(now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(AppError::Conflict {
                    message: format!("a song with video id {:?} already exists", video_id),
                });
            }
            Err(other) => return Err(other.into()),
        }

        self.get_song(id).await
    }

    pub async fn get_song(&self, id: Uuid) -> Result<Song> {
        sqlx::query_as::<_, Song>("SELECT * FROM songs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Song"))
    }

    pub async fn find_by_video_id(&self, video_id: &str) -> Result<Option<Song>> {
        Ok(sqlx::query_as::<_, Song>(
            "SELECT * FROM songs WHERE video_id = ? AND source = 'youtube'",
        )
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Partial metadata update from the API. Recomputes the normalized artist
    /// when the artist changes.
    pub async fn update_song(&self, id: Uuid, patch: &SongPatch) -> Result<Song> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, Song>("SELECT * FROM songs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Song"))?;

        let title = patch.title.clone().unwrap_or(existing.title);
        let artist = patch.artist.clone().unwrap_or(existing.artist);
        let normalized = search::normalize(&artist);
        let album = patch.album.clone().or(existing.album);
        let year = patch.year.or(existing.year);
        let genre = patch.genre.clone().or(existing.genre);
        let language = patch.language.clone().or(existing.language);
        let duration_ms = patch.duration_ms.or(existing.duration_ms);
        let favorite = patch.favorite.unwrap_or(existing.favorite);

        sqlx::query(
            r#"UPDATE songs SET title = ?, artist = ?, artist_normalized = ?, album = ?,
               year = ?, genre = ?, language = ?, duration_ms = ?, favorite = ?
               WHERE id = ?"#,
        )
        .bind(&title)
        .bind(&artist)
        .bind(&normalized)
        .bind(&album)
        .bind(year)
        .bind(&genre)
        .bind(&language)
        .bind(duration_ms)
        .bind(favorite)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get_song(id).await
    }

    pub async fn set_status(&self, id: Uuid, status: SongStatus) -> Result<()> {
        let updated = sqlx::query("UPDATE songs SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::not_found("Song"));
        }
        Ok(())
    }

    /// Merge file keys into the song's path mapping. Only the worker that
    /// owns the song's job writes here, so read-modify-write in a transaction
    /// is race-free.
    pub async fn merge_paths(&self, id: Uuid, update: impl FnOnce(&mut SongPaths)) -> Result<Song> {
        let mut tx = self.pool.begin().await?;
        let song = sqlx::query_as::<_, Song>("SELECT * FROM songs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Song"))?;

        let mut paths = song.paths.clone();
        update(&mut paths);

        sqlx::query("UPDATE songs SET paths = ? WHERE id = ?")
            .bind(serde_json::to_string(&paths)?)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get_song(id).await
    }

    pub async fn set_duration(&self, id: Uuid, duration_ms: i64) -> Result<()> {
        sqlx::query("UPDATE songs SET duration_ms = ? WHERE id = ?")
            .bind(duration_ms)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_thumbnails(&self, id: Uuid, thumbnails: &[Thumbnail]) -> Result<()> {
        sqlx::query("UPDATE songs SET thumbnails = ? WHERE id = ?")
            .bind(serde_json::to_string(thumbnails)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Write enrichment results. Overwrites previous iTunes ids: re-running
    /// enrichment adopts the latest top hit.
    pub async fn apply_metadata(&self, id: Uuid, update: &MetadataUpdate) -> Result<()> {
        sqlx::query(
            r#"UPDATE songs SET itunes_ids = ?,
               genre = COALESCE(?, genre),
               year = COALESCE(?, year),
               language = COALESCE(?, language)
               WHERE id = ?"#,
        )
        .bind(serde_json::to_string(&update.itunes_ids)?)
        .bind(&update.genre)
        .bind(update.year)
        .bind(&update.language)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a song. Refused while any non-terminal job references it;
    /// terminal jobs, queue entries and lyrics for the song go with it.
    pub async fn delete_song(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM songs WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if exists == 0 {
            return Err(AppError::not_found("Song"));
        }

        let active = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM jobs WHERE song_id = ?
               AND status NOT IN ('completed', 'failed', 'cancelled')"#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(AppError::InUse {
                message: "song has an active job".to_string(),
            });
        }

        sqlx::query("DELETE FROM jobs WHERE song_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM queue_entries WHERE song_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM lyrics WHERE song_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_songs(&self, options: &ListOptions) -> Result<Page<Song>> {
        let (offset, limit) = options.clamp();
        let column = sort_column(options.sort_by.as_deref())?;
        let direction = SortDirection::parse(options.direction.as_deref())?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM songs")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT * FROM songs ORDER BY {} {}, date_added DESC LIMIT ? OFFSET ?",
            column,
            direction.sql()
        );
        let items = sqlx::query_as::<_, Song>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items,
            total,
            offset,
            limit,
        })
    }

    /// Fuzzy search over title/artist/album. Relevance descending, ties by
    /// `date_added` descending; deterministic, so identical queries against
    /// an unchanged store serialize identically.
    pub async fn search_songs(
        &self,
        query: &str,
        offset: i64,
        limit: i64,
        group_by_artist: bool,
    ) -> Result<Page<Song>> {
        let offset = offset.max(0);
        let limit = if limit <= 0 { 50 } else { limit.min(500) };

        let all = sqlx::query_as::<_, Song>("SELECT * FROM songs ORDER BY date_added DESC")
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<(u32, Song)> = all
            .into_iter()
            .filter_map(|song| {
                search::relevance(query, &song.title, &song.artist, song.album.as_deref())
                    .map(|score| (score, song))
            })
            .collect();

        if group_by_artist {
            scored.sort_by(|(sa, a), (sb, b)| {
                search::artist_sort_key(&a.artist)
                    .cmp(&search::artist_sort_key(&b.artist))
                    .then(sb.cmp(sa))
                    .then(b.date_added.cmp(&a.date_added))
            });
        } else {
            scored.sort_by(|(sa, a), (sb, b)| {
                sb.cmp(sa).then(b.date_added.cmp(&a.date_added))
            });
        }

        let total = scored.len() as i64;
        let items = scored
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(_, song)| song)
            .collect();

        Ok(Page {
            items,
            total,
            offset,
            limit,
        })
    }

    /// Derived artist view: group songs by normalized artist name. Sorted
    /// alphabetically ignoring a leading "The "; names under `#` come first.
    pub async fn list_artists(
        &self,
        search_term: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Page<Artist>> {
        let offset = offset.max(0);
        let limit = if limit <= 0 { 100 } else { limit.min(500) };

        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"SELECT MIN(artist) AS name, COUNT(*) AS song_count
               FROM songs GROUP BY artist_normalized"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let needle = search_term.map(search::normalize);
        let mut artists: Vec<Artist> = rows
            .into_iter()
            .filter(|(name, _)| match &needle {
                Some(needle) => search::normalize(name).contains(needle.as_str()),
                None => true,
            })
            .map(|(name, song_count)| Artist {
                first_letter: search::artist_first_letter(&name),
                name,
                song_count,
            })
            .collect();

        artists.sort_by(|a, b| {
            let a_hash = a.first_letter == "#";
            let b_hash = b.first_letter == "#";
            b_hash
                .cmp(&a_hash)
                .then_with(|| search::artist_sort_key(&a.name).cmp(&search::artist_sort_key(&b.name)))
        });

        let total = artists.len() as i64;
        let items = artists
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(Page {
            items,
            total,
            offset,
            limit,
        })
    }

    pub async fn list_songs_by_artist(
        &self,
        artist_name: &str,
        options: &ListOptions,
    ) -> Result<Page<Song>> {
        let (offset, limit) = options.clamp();
        let column = sort_column(options.sort_by.as_deref())?;
        let direction = SortDirection::parse(options.direction.as_deref())?;
        let normalized = search::normalize(artist_name);

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM songs WHERE artist_normalized = ?",
        )
        .bind(&normalized)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "SELECT * FROM songs WHERE artist_normalized = ? ORDER BY {} {}, date_added DESC LIMIT ? OFFSET ?",
            column,
            direction.sql()
        );
        let items = sqlx::query_as::<_, Song>(&sql)
            .bind(&normalized)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items,
            total,
            offset,
            limit,
        })
    }

    pub async fn get_lyrics(&self, song_id: Uuid) -> Result<Lyrics> {
        sqlx::query_as::<_, Lyrics>("SELECT * FROM lyrics WHERE song_id = ?")
            .bind(song_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Lyrics"))
    }

    /// Upsert lyrics for a song. Synced text must parse as LRC with
    /// non-decreasing timestamps.
    pub async fn set_lyrics(&self, song_id: Uuid, request: &SetLyricsRequest) -> Result<Lyrics> {
        if let Some(synced) = request.synced_text.as_deref() {
            if let Err(e) = lrc::parse(synced) {
                return Err(AppError::invalid("syncedText", e.to_string()));
            }
        }

        // Lyrics are one-to-one with an existing song.
        self.get_song(song_id).await?;

        sqlx::query(
            r#"INSERT INTO lyrics
               (song_id, plain_text, synced_text, language_code, source, duration_hint_ms, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (song_id) DO UPDATE SET
                   plain_text = excluded.plain_text,
                   synced_text = excluded.synced_text,
                   language_code = excluded.language_code,
                   source = excluded.source,
                   duration_hint_ms = excluded.duration_hint_ms,
                   updated_at = excluded.updated_at"#,
        )
        .bind(song_id)
        .bind(&request.plain_text)
        .bind(&request.synced_text)
        .bind(&request.language_code)
        .bind(&request.source)
        .bind(request.duration_hint_ms)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_lyrics(song_id).await
    }
}
