//! In-memory document repository for users, sessions and saved maps.

use std::collections::HashMap;

use foundation::math::LngLat;
use foundation::{MarkerId, Timestamp};
use parking_lot::RwLock;
use scene::{
    geojson, validate_color, validate_image, Marker, MarkerError, MarkerIcon, DEFAULT_MARKER_COLOR,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::PasswordHash;
use crate::error::{ApiError, ApiResult};

pub const DEFAULT_MAP_ZOOM: f64 = 10.0;

#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: String,
    pub is_active: bool,
    pub password: PasswordHash,
    pub created_at: Timestamp,
    pub last_login: Option<Timestamp>,
}

/// A user as returned to clients; never carries the password.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: String,
    pub created_at: Timestamp,
    pub last_login: Option<Timestamp>,
}

impl From<&User> for UserProfile {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            bio: u.bio.clone(),
            role: u.role.clone(),
            created_at: u.created_at,
            last_login: u.last_login,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDocument {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner: Uuid,
    pub is_public: bool,
    pub center: LngLat,
    pub zoom: f64,
    /// GeoJSON `Feature` objects as submitted.
    pub features: Vec<Value>,
    pub markers: Vec<Marker>,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Listing view of a map, without its features and markers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner: Uuid,
    pub owner_name: Option<String>,
    pub is_public: bool,
    pub center: LngLat,
    pub zoom: f64,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Body of map create and update. Absent fields keep their current value.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub center: Option<LngLat>,
    pub zoom: Option<f64>,
    pub features: Option<Vec<Value>>,
    pub is_public: Option<bool>,
    pub tags: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapFilter {
    pub user_id: Option<Uuid>,
    pub is_public: Option<bool>,
    /// Comma separated; a map matches when it carries any of them.
    pub tags: Option<String>,
}

/// Body of marker create and update.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkerFields {
    pub title: Option<String>,
    pub location: Option<LngLat>,
    pub description: Option<String>,
    pub icon: Option<MarkerIcon>,
    pub color: Option<String>,
    pub image: Option<String>,
}

struct Session {
    user: Uuid,
    expires_at: Timestamp,
}

#[derive(Default)]
pub struct Repository {
    users: RwLock<Vec<User>>,
    sessions: RwLock<HashMap<Uuid, Session>>,
    maps: RwLock<Vec<MapDocument>>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, reg: Registration, now: Timestamp) -> ApiResult<UserProfile> {
        let username = reg.username.trim();
        let email = reg.email.trim().to_lowercase();
        if username.is_empty() || email.is_empty() || reg.password.is_empty() {
            return Err(ApiError::BadRequest(
                "Please provide username, email, and password".to_string(),
            ));
        }

        let password = PasswordHash::new(&reg.password)?;
        let mut users = self.users.write();
        if users.iter().any(|u| u.email == email) {
            return Err(ApiError::BadRequest("Email already in use".to_string()));
        }
        if users.iter().any(|u| u.username == username) {
            return Err(ApiError::BadRequest("Username already taken".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email,
            first_name: reg.first_name,
            last_name: reg.last_name,
            bio: String::new(),
            role: "user".to_string(),
            is_active: true,
            password,
            created_at: now,
            last_login: None,
        };
        tracing::info!(user = %user.id, username = %user.username, "user registered");
        let profile = UserProfile::from(&user);
        users.push(user);
        Ok(profile)
    }

    pub fn login(&self, email: &str, password: &str, now: Timestamp) -> ApiResult<UserProfile> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ApiError::BadRequest(
                "Please provide email and password".to_string(),
            ));
        }
        let email = email.trim().to_lowercase();
        let mut users = self.users.write();
        let user = users
            .iter_mut()
            .find(|u| u.email == email)
            .filter(|u| u.password.verify(password))
            .ok_or(ApiError::InvalidCredentials)?;
        if !user.is_active {
            return Err(ApiError::Forbidden(
                "Your account has been deactivated".to_string(),
            ));
        }
        user.last_login = Some(now);
        Ok(UserProfile::from(&*user))
    }

    pub fn profile(&self, user: Uuid) -> ApiResult<UserProfile> {
        self.users
            .read()
            .iter()
            .find(|u| u.id == user)
            .map(UserProfile::from)
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    pub fn update_profile(&self, user: Uuid, update: ProfileUpdate) -> ApiResult<UserProfile> {
        let password = update
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PasswordHash::new)
            .transpose()?;
        let mut users = self.users.write();
        let username = update.username.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let email = update
            .email
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        if let Some(name) = username {
            if users.iter().any(|u| u.id != user && u.username == name) {
                return Err(ApiError::BadRequest("Username already taken".to_string()));
            }
        }
        if let Some(email) = &email {
            if users.iter().any(|u| u.id != user && &u.email == email) {
                return Err(ApiError::BadRequest("Email already in use".to_string()));
            }
        }

        let u = users
            .iter_mut()
            .find(|u| u.id == user)
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        if let Some(name) = username {
            u.username = name.to_string();
        }
        if let Some(email) = email {
            u.email = email;
        }
        // Empty strings leave a field unchanged.
        for (field, value) in [
            (&mut u.first_name, update.first_name),
            (&mut u.last_name, update.last_name),
            (&mut u.bio, update.bio),
        ] {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                *field = v;
            }
        }
        if let Some(password) = password {
            u.password = password;
        }
        Ok(UserProfile::from(&*u))
    }

    pub fn issue_token(&self, user: Uuid, now: Timestamp, ttl_ms: i64) -> Uuid {
        let token = Uuid::new_v4();
        let mut sessions = self.sessions.write();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            token,
            Session {
                user,
                expires_at: now.plus_millis(ttl_ms),
            },
        );
        token
    }

    /// The user a live token belongs to. Deactivated users are refused.
    pub fn authenticate(&self, token: Uuid, now: Timestamp) -> Option<Uuid> {
        let user = self
            .sessions
            .read()
            .get(&token)
            .filter(|s| s.expires_at > now)
            .map(|s| s.user)?;
        self.users
            .read()
            .iter()
            .any(|u| u.id == user && u.is_active)
            .then_some(user)
    }

    pub fn list_maps(&self, viewer: Option<Uuid>, filter: &MapFilter) -> Vec<MapSummary> {
        let tags: Vec<&str> = filter
            .tags
            .as_deref()
            .map(|t| t.split(',').map(str::trim).filter(|t| !t.is_empty()).collect())
            .unwrap_or_default();
        let users = self.users.read();
        self.maps
            .read()
            .iter()
            .filter(|m| match filter.user_id {
                Some(owner) => m.owner == owner && (m.is_public || viewer == Some(owner)),
                None => m.is_public || viewer == Some(m.owner),
            })
            .filter(|m| filter.is_public.map_or(true, |p| m.is_public == p))
            .filter(|m| tags.is_empty() || m.tags.iter().any(|t| tags.contains(&t.as_str())))
            .map(|m| MapSummary {
                id: m.id,
                name: m.name.clone(),
                description: m.description.clone(),
                owner: m.owner,
                owner_name: users
                    .iter()
                    .find(|u| u.id == m.owner)
                    .map(|u| u.username.clone()),
                is_public: m.is_public,
                center: m.center,
                zoom: m.zoom,
                tags: m.tags.clone(),
                created_at: m.created_at,
                updated_at: m.updated_at,
            })
            .collect()
    }

    /// A map the viewer may see: public, or owned by the viewer.
    pub fn get_map(&self, id: Uuid, viewer: Option<Uuid>) -> ApiResult<MapDocument> {
        let maps = self.maps.read();
        let map = maps.iter().find(|m| m.id == id).ok_or_else(map_not_found)?;
        if !map.is_public && viewer != Some(map.owner) {
            return Err(ApiError::Forbidden(
                "You do not have permission to access this map".to_string(),
            ));
        }
        Ok(map.clone())
    }

    pub fn create_map(
        &self,
        owner: Uuid,
        fields: MapFields,
        now: Timestamp,
    ) -> ApiResult<MapDocument> {
        let name = fields.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let (Some(name), Some(center)) = (name, fields.center) else {
            return Err(ApiError::BadRequest(
                "Name and center coordinates are required".to_string(),
            ));
        };
        validate_center(center)?;
        let zoom = fields.zoom.unwrap_or(DEFAULT_MAP_ZOOM);
        validate_zoom(zoom)?;
        let features = fields.features.unwrap_or_default();
        for f in &features {
            validate_feature(f)?;
        }

        let map = MapDocument {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: fields.description.unwrap_or_default(),
            owner,
            is_public: fields.is_public.unwrap_or(false),
            center,
            zoom,
            features,
            markers: Vec::new(),
            tags: fields.tags.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        tracing::info!(map = %map.id, %owner, "map created");
        self.maps.write().push(map.clone());
        Ok(map)
    }

    pub fn update_map(
        &self,
        id: Uuid,
        user: Uuid,
        fields: MapFields,
        now: Timestamp,
    ) -> ApiResult<MapDocument> {
        if let Some(center) = fields.center {
            validate_center(center)?;
        }
        if let Some(zoom) = fields.zoom {
            validate_zoom(zoom)?;
        }
        for f in fields.features.iter().flatten() {
            validate_feature(f)?;
        }
        self.with_owned_map(id, user, "update this map", |map| {
            if let Some(name) = fields.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                map.name = name.to_string();
            }
            if let Some(description) = fields.description {
                map.description = description;
            }
            if let Some(center) = fields.center {
                map.center = center;
            }
            if let Some(zoom) = fields.zoom {
                map.zoom = zoom;
            }
            if let Some(features) = fields.features {
                map.features = features;
            }
            if let Some(is_public) = fields.is_public {
                map.is_public = is_public;
            }
            if let Some(tags) = fields.tags {
                map.tags = tags;
            }
            map.updated_at = now;
            Ok(map.clone())
        })
    }

    pub fn delete_map(&self, id: Uuid, user: Uuid) -> ApiResult<()> {
        let mut maps = self.maps.write();
        let idx = maps.iter().position(|m| m.id == id).ok_or_else(map_not_found)?;
        if maps[idx].owner != user {
            return Err(forbidden("delete this map"));
        }
        maps.remove(idx);
        tracing::info!(map = %id, "map deleted");
        Ok(())
    }

    pub fn add_feature(
        &self,
        id: Uuid,
        user: Uuid,
        feature: Option<Value>,
        now: Timestamp,
    ) -> ApiResult<MapDocument> {
        let feature = feature
            .filter(|f| f.get("geometry").is_some_and(|g| !g.is_null()))
            .ok_or_else(|| ApiError::BadRequest("Valid feature data is required".to_string()))?;
        validate_feature(&feature)?;
        self.with_owned_map(id, user, "modify this map", |map| {
            map.features.push(feature);
            map.updated_at = now;
            Ok(map.clone())
        })
    }

    pub fn list_markers(&self, id: Uuid, viewer: Option<Uuid>) -> ApiResult<Vec<Marker>> {
        self.get_map(id, viewer).map(|m| m.markers)
    }

    pub fn add_marker(
        &self,
        id: Uuid,
        user: Uuid,
        fields: MarkerFields,
        now: Timestamp,
    ) -> ApiResult<Marker> {
        let (Some(title), Some(location)) = (fields.title.clone(), fields.location) else {
            return Err(ApiError::BadRequest(
                "Marker data must include location and title".to_string(),
            ));
        };
        let mut marker = Marker {
            id: MarkerId::generate(),
            location,
            title,
            description: String::new(),
            icon: MarkerIcon::default(),
            color: DEFAULT_MARKER_COLOR.to_string(),
            image: None,
            created_at: now,
            updated_at: now,
        };
        apply_marker_fields(&mut marker, fields)?;
        self.with_owned_map(id, user, "modify this map", |map| {
            map.markers.push(marker.clone());
            map.updated_at = now;
            Ok(marker)
        })
    }

    pub fn update_marker(
        &self,
        id: Uuid,
        user: Uuid,
        marker_id: &MarkerId,
        fields: MarkerFields,
        now: Timestamp,
    ) -> ApiResult<Marker> {
        self.with_owned_map(id, user, "modify this map", |map| {
            let marker = map
                .markers
                .iter_mut()
                .find(|m| &m.id == marker_id)
                .ok_or_else(marker_not_found)?;
            let mut edited = marker.clone();
            apply_marker_fields(&mut edited, fields)?;
            edited.updated_at = now;
            *marker = edited.clone();
            map.updated_at = now;
            Ok(edited)
        })
    }

    pub fn delete_marker(
        &self,
        id: Uuid,
        user: Uuid,
        marker_id: &MarkerId,
        now: Timestamp,
    ) -> ApiResult<()> {
        self.with_owned_map(id, user, "modify this map", |map| {
            let before = map.markers.len();
            map.markers.retain(|m| &m.id != marker_id);
            if map.markers.len() == before {
                return Err(marker_not_found());
            }
            map.updated_at = now;
            Ok(())
        })
    }

    fn with_owned_map<T>(
        &self,
        id: Uuid,
        user: Uuid,
        action: &str,
        f: impl FnOnce(&mut MapDocument) -> ApiResult<T>,
    ) -> ApiResult<T> {
        let mut maps = self.maps.write();
        let map = maps.iter_mut().find(|m| m.id == id).ok_or_else(map_not_found)?;
        if map.owner != user {
            return Err(forbidden(action));
        }
        f(map)
    }
}

fn map_not_found() -> ApiError {
    ApiError::NotFound("Map not found".to_string())
}

fn marker_not_found() -> ApiError {
    ApiError::NotFound("Marker not found".to_string())
}

fn forbidden(action: &str) -> ApiError {
    ApiError::Forbidden(format!("You do not have permission to {action}"))
}

fn validate_center(center: LngLat) -> ApiResult<()> {
    if center.is_valid() && (-180.0..=180.0).contains(&center.lng) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "center [{}, {}] is not a valid position",
            center.lng, center.lat
        )))
    }
}

fn validate_zoom(zoom: f64) -> ApiResult<()> {
    if zoom.is_finite() && (0.0..=24.0).contains(&zoom) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("zoom {zoom} is out of range")))
    }
}

/// A stored feature must be a GeoJSON feature whose geometry the map can draw.
fn validate_feature(feature: &Value) -> ApiResult<()> {
    let invalid = |why: String| ApiError::BadRequest(format!("invalid feature: {why}"));
    let import = geojson::import_value(feature).map_err(|e| invalid(e.to_string()))?;
    if import.skipped > 0 || import.drafts.is_empty() {
        return Err(invalid("unsupported or malformed geometry".to_string()));
    }
    for draft in import.drafts {
        let mut geometry = draft.geometry;
        geometry.normalize().map_err(|e| invalid(e.to_string()))?;
    }
    Ok(())
}

fn apply_marker_fields(marker: &mut Marker, fields: MarkerFields) -> ApiResult<()> {
    let invalid = |e: MarkerError| ApiError::BadRequest(e.to_string());
    if let Some(title) = fields.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::BadRequest("Marker title is required".to_string()));
        }
        marker.title = title.to_string();
    }
    if let Some(location) = fields.location {
        if !location.is_valid() {
            return Err(ApiError::BadRequest(format!(
                "invalid location [{}, {}]",
                location.lng, location.lat
            )));
        }
        marker.location = location;
    }
    if let Some(description) = fields.description {
        marker.description = description;
    }
    if let Some(icon) = fields.icon {
        marker.icon = icon;
    }
    if let Some(color) = fields.color {
        validate_color(&color).map_err(invalid)?;
        marker.color = color;
    }
    if let Some(image) = fields.image {
        if image.is_empty() {
            marker.image = None;
        } else {
            validate_image(&image).map_err(invalid)?;
            marker.image = Some(image);
        }
    }
    Ok(())
}
