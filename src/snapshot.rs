use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::AccountId;

/// An AMI, as listed by `ec2 describe-images`
#[derive(Clone, Debug, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    pub image_id: String,
    #[serde(default)]
    pub owner_id: Option<AccountId>,
}

/// An EBS volume, as listed by `ec2 describe-volumes`
#[derive(Clone, Debug, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    pub volume_id: String,
}

/// An EBS snapshot, as listed by `ec2 describe-snapshots`
#[derive(Clone, Debug, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Snapshot {
    pub snapshot_id: String,
    #[serde(default)]
    pub volume_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: Option<AccountId>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct ImageList {
    #[serde(rename = "Images", default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct VolumeList {
    #[serde(rename = "Volumes", default)]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct SnapshotList {
    #[serde(rename = "Snapshots", default)]
    pub snapshots: Vec<Snapshot>,
}

/// The kind of resource whose disappearance orphaned a snapshot
#[derive(Clone, Copy, Debug, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingResource {
    /// The AMI the snapshot was created for
    Image,
    /// The volume the snapshot was taken from
    Volume,
}

/// A snapshot that no longer belongs to an existing image or volume
#[derive(Clone, Debug, serde::Serialize, PartialEq, Eq)]
pub struct Orphan {
    pub snapshot: String,
    pub missing: MissingResource,
    /// The id of the missing resource, empty if the snapshot names no volume
    pub resource: String,
}

impl fmt::Display for Orphan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - orphan because {} no longer exists", self.snapshot, self.resource)
    }
}

/// Finds the snapshots of an account that lost their image or volume
///
/// Snapshots created by `CreateImage` belong to their AMI and are only orphaned
/// once that AMI is gone, even if the source volume was deleted long ago. All
/// other snapshots are orphaned when their source volume no longer exists.
#[derive(Debug)]
pub struct OrphanFinder {
    account: AccountId,
    images: HashSet<String>,
    volumes: HashSet<String>,
}

impl OrphanFinder {
    /// Creates a finder for the snapshots owned by `account`
    ///
    /// Images owned by other accounts don't keep snapshots alive.
    pub fn new(account: AccountId, images: &[Image], volumes: &[Volume]) -> Self {
        let images = images
            .iter()
            .filter(|image| owned_by(image.owner_id.as_ref(), &account))
            .map(|image| image.image_id.clone())
            .collect();
        let volumes = volumes.iter().map(|volume| volume.volume_id.clone()).collect();

        Self {
            account,
            images,
            volumes,
        }
    }

    /// Checks a single snapshot, `None` if it's still in use or owned by another account
    pub fn check(&self, snapshot: &Snapshot) -> Option<Orphan> {
        if !owned_by(snapshot.owner_id.as_ref(), &self.account) {
            return None;
        }

        let image = snapshot
            .description
            .as_deref()
            .and_then(|description| create_image_pattern().captures(description))
            .and_then(|captures| captures.get(2));
        if let Some(image) = image {
            return match self.images.contains(image.as_str()) {
                true => None,
                false => Some(Orphan {
                    snapshot: snapshot.snapshot_id.clone(),
                    missing: MissingResource::Image,
                    resource: image.as_str().to_owned(),
                }),
            };
        }

        let volume = snapshot.volume_id.as_deref().unwrap_or_default();
        match self.volumes.contains(volume) {
            true => None,
            false => Some(Orphan {
                snapshot: snapshot.snapshot_id.clone(),
                missing: MissingResource::Volume,
                resource: volume.to_owned(),
            }),
        }
    }

    /// All orphaned snapshots, in the order they are listed
    pub fn find<'a>(&'a self, snapshots: &'a [Snapshot]) -> impl Iterator<Item = Orphan> + 'a {
        snapshots.iter().filter_map(move |snapshot| self.check(snapshot))
    }
}

static CREATE_IMAGE_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Matches the description AWS gives snapshots taken for a new AMI
fn create_image_pattern() -> &'static Regex {
    CREATE_IMAGE_PATTERN.get_or_init(|| {
        Regex::new(r"Created by CreateImage\(i-(\w{8}|\w{17})\) for (ami-(?:\w{8}|\w{17})) from vol-(\w{8}|\w{17})")
            .expect("the CreateImage pattern is valid")
    })
}

// resources without an owner are listed by the account itself
fn owned_by(owner: Option<&AccountId>, account: &AccountId) -> bool {
    owner.map_or(true, |owner| owner == account)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGES: &str = r#"{"Images": [
        {"ImageId": "ami-1234abcd", "OwnerId": "111122223333"},
        {"ImageId": "ami-0123456789abcdef0", "OwnerId": "111122223333"},
        {"ImageId": "ami-deadbeef", "OwnerId": "999999999999"}
    ]}"#;

    const VOLUMES: &str = r#"{"Volumes": [
        {"VolumeId": "vol-11111111", "Size": 8},
        {"VolumeId": "vol-0aaaaaaaaaaaaaaaa"}
    ]}"#;

    fn finder() -> OrphanFinder {
        let images: ImageList = serde_json::from_str(IMAGES).unwrap();
        let volumes: VolumeList = serde_json::from_str(VOLUMES).unwrap();
        OrphanFinder::new("111122223333".parse().unwrap(), &images.images, &volumes.volumes)
    }

    fn snapshot(id: &str, volume: Option<&str>, description: &str) -> Snapshot {
        Snapshot {
            snapshot_id: id.to_owned(),
            volume_id: volume.map(str::to_owned),
            description: Some(description.to_owned()),
            owner_id: Some("111122223333".parse().unwrap()),
        }
    }

    #[test]
    fn create_image_description() {
        let captures = create_image_pattern()
            .captures("Created by CreateImage(i-0abcdef1234567890) for ami-1234abcd from vol-11111111")
            .unwrap();
        assert_eq!(&captures[2], "ami-1234abcd");

        assert!(create_image_pattern()
            .captures("Created by CreateImage(i-abc) for ami-1234abcd from vol-11111111")
            .is_none());
        assert!(std::ptr::eq(create_image_pattern(), create_image_pattern()));
    }

    #[test]
    fn snapshot_of_existing_volume() {
        let snap = snapshot("snap-1", Some("vol-11111111"), "backup");
        assert_eq!(finder().check(&snap), None);
    }

    #[test]
    fn snapshot_of_deleted_volume() {
        let snap = snapshot("snap-1", Some("vol-22222222"), "backup");
        let orphan = finder().check(&snap).unwrap();

        assert_eq!(orphan.missing, MissingResource::Volume);
        assert_eq!(orphan.to_string(), "snap-1 - orphan because vol-22222222 no longer exists");
    }

    #[test]
    fn image_snapshot_kept_alive_by_image() {
        let snap = snapshot(
            "snap-1",
            Some("vol-22222222"),
            "Created by CreateImage(i-abcd1234) for ami-1234abcd from vol-22222222",
        );
        assert_eq!(finder().check(&snap), None);
    }

    #[test]
    fn image_snapshot_with_long_ids() {
        let snap = snapshot(
            "snap-1",
            Some("vol-0bbbbbbbbbbbbbbbb"),
            "Created by CreateImage(i-0abcdef1234567890) for ami-0123456789abcdef0 from vol-0bbbbbbbbbbbbbbbb",
        );
        assert_eq!(finder().check(&snap), None);
    }

    #[test]
    fn image_snapshot_of_deregistered_image() {
        let snap = snapshot(
            "snap-1",
            Some("vol-11111111"),
            "Created by CreateImage(i-abcd1234) for ami-99999999 from vol-11111111",
        );
        let orphan = finder().check(&snap).unwrap();

        assert_eq!(orphan.missing, MissingResource::Image);
        assert_eq!(orphan.to_string(), "snap-1 - orphan because ami-99999999 no longer exists");
    }

    #[test]
    fn foreign_image_does_not_keep_snapshot() {
        let snap = snapshot(
            "snap-1",
            Some("vol-11111111"),
            "Created by CreateImage(i-abcd1234) for ami-deadbeef from vol-11111111",
        );
        assert_eq!(finder().check(&snap).unwrap().resource, "ami-deadbeef");
    }

    #[test]
    fn snapshot_without_volume() {
        let snap = snapshot("snap-1", None, "Copied for DestinationAmi");
        let orphan = finder().check(&snap).unwrap();

        assert_eq!(orphan.missing, MissingResource::Volume);
        assert_eq!(orphan.resource, "");
    }

    #[test]
    fn foreign_snapshots_are_ignored() {
        let mut snap = snapshot("snap-1", Some("vol-22222222"), "backup");
        snap.owner_id = Some("999999999999".parse().unwrap());
        assert_eq!(finder().check(&snap), None);
    }

    #[test]
    fn orphans_in_listing_order() {
        let snapshots: SnapshotList = serde_json::from_str(
            r#"{"Snapshots": [
                {"SnapshotId": "snap-3", "VolumeId": "vol-33333333", "Description": ""},
                {"SnapshotId": "snap-2", "VolumeId": "vol-11111111", "Description": ""},
                {"SnapshotId": "snap-1", "VolumeId": "vol-44444444"}
            ]}"#,
        )
        .unwrap();
        let finder = finder();

        let orphans: Vec<_> = finder
            .find(&snapshots.snapshots)
            .map(|orphan| orphan.snapshot)
            .collect();
        assert_eq!(orphans, ["snap-3", "snap-1"]);
    }
}
