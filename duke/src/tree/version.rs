use std::cmp::Ordering;
use crate::ClassError;

/// Represents a class file version.
///
/// Use the associated constants (like [`Version::V1_1`]) if you want that version.
///
/// Take a look at [the list of class file versions](https://docs.oracle.com/javase/specs/jvms/se9/html/jvms-4.html#jvms-4.1-200-B.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
	pub major: u16,
	pub minor: u16,
}

impl Version {
	pub const V1_1: Version = Version::new(45, 3);
	pub const V1_2: Version = Version::new(46, 0);
	pub const V1_3: Version = Version::new(47, 0);
	pub const V1_4: Version = Version::new(48, 0);
	pub const V1_5: Version = Version::new(49, 0);
	pub const V1_6: Version = Version::new(50, 0);
	pub const V1_7: Version = Version::new(51, 0);
	pub const V1_8: Version = Version::new(52, 0);
	pub const V9: Version = Version::new(53, 0);

	/// The newest version that can be read and written.
	pub const MAX: Version = Version::V9;

	pub const fn new(major: u16, minor: u16) -> Version {
		Version { major, minor }
	}

	/// Checks that this version is one of `45.x` up to `53.x`.
	pub(crate) fn check_supported(self) -> Result<Version, ClassError> {
		if (45..=Version::MAX.major).contains(&self.major) {
			Ok(self)
		} else {
			Err(ClassError::BadVersion { major: self.major, minor: self.minor })
		}
	}

	/// Starting with this version, methods with code need a `StackMapTable` at branch targets.
	pub(crate) fn has_stack_map_frames(self) -> bool {
		self >= Version::V1_6
	}
}

impl PartialOrd for Version {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Version {
	fn cmp(&self, other: &Self) -> Ordering {
		self.major.cmp(&other.major)
			.then_with(|| self.minor.cmp(&other.minor))
	}
}
