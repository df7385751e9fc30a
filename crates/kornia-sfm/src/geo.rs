//! WGS84 geodesy.
//!
//! Converts geodetic coordinates (latitude, longitude in degrees, altitude in metres)
//! to earth-centered earth-fixed (ECEF) coordinates and to a local east-north-up
//! tangent plane anchored at a reference position.

use serde::{Deserialize, Serialize};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_B: f64 = 6_356_752.314_245;

/// A geodetic position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Lla {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in metres above the ellipsoid.
    pub altitude: f64,
}

impl Lla {
    /// Create a new geodetic position.
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

/// Projection of geodetic positions into a local metric frame.
pub trait LocalTangentPlane {
    /// Returns the east-north-up coordinates of `lla` in metres.
    fn topocentric(&self, lla: &Lla) -> [f64; 3];
}

impl<T: LocalTangentPlane + ?Sized> LocalTangentPlane for &T {
    fn topocentric(&self, lla: &Lla) -> [f64; 3] {
        (**self).topocentric(lla)
    }
}

/// Compute the ECEF coordinates of a geodetic position.
pub fn ecef_from_lla(lla: &Lla) -> [f64; 3] {
    let a2 = WGS84_A * WGS84_A;
    let b2 = WGS84_B * WGS84_B;
    let lat = lla.latitude.to_radians();
    let lon = lla.longitude.to_radians();
    let l = 1.0 / (a2 * lat.cos().powi(2) + b2 * lat.sin().powi(2)).sqrt();
    [
        (a2 * l + lla.altitude) * lat.cos() * lon.cos(),
        (a2 * l + lla.altitude) * lat.cos() * lon.sin(),
        (b2 * l + lla.altitude) * lat.sin(),
    ]
}

/// Compute the geodetic position of ECEF coordinates.
pub fn lla_from_ecef(ecef: &[f64; 3]) -> Lla {
    let [x, y, z] = *ecef;
    let a = WGS84_A;
    let b = WGS84_B;
    let ea = ((a * a - b * b) / (a * a)).sqrt();
    let eb = ((a * a - b * b) / (b * b)).sqrt();
    let p = (x * x + y * y).sqrt();
    let theta = (z * a).atan2(p * b);
    let lon = y.atan2(x);
    let lat = (z + eb * eb * b * theta.sin().powi(3)).atan2(p - ea * ea * a * theta.cos().powi(3));
    let n = a / (1.0 - ea * ea * lat.sin().powi(2)).sqrt();
    let alt = p / lat.cos() - n;
    Lla::new(lat.to_degrees(), lon.to_degrees(), alt)
}

/// Rows of the rotation from ECEF offsets to east-north-up at `reference`.
fn enu_rotation(reference: &Lla) -> [[f64; 3]; 3] {
    let lat = reference.latitude.to_radians();
    let lon = reference.longitude.to_radians();
    let (sa, ca) = lat.sin_cos();
    let (so, co) = lon.sin_cos();
    [
        [-so, co, 0.0],
        [-sa * co, -sa * so, ca],
        [ca * co, ca * so, sa],
    ]
}

/// Compute the east-north-up coordinates of `lla` relative to `reference`.
pub fn topocentric_from_lla(lla: &Lla, reference: &Lla) -> [f64; 3] {
    let p = ecef_from_lla(lla);
    let r = ecef_from_lla(reference);
    let d = [p[0] - r[0], p[1] - r[1], p[2] - r[2]];
    let rot = enu_rotation(reference);
    let mut enu = [0.0; 3];
    for (out, row) in enu.iter_mut().zip(rot.iter()) {
        *out = row[0] * d[0] + row[1] * d[1] + row[2] * d[2];
    }
    enu
}

/// Compute the geodetic position of east-north-up coordinates relative to `reference`.
pub fn lla_from_topocentric(enu: &[f64; 3], reference: &Lla) -> Lla {
    let r = ecef_from_lla(reference);
    let rot = enu_rotation(reference);
    // the rotation is orthonormal, apply its transpose
    let mut ecef = r;
    for (i, value) in ecef.iter_mut().enumerate() {
        *value += rot[0][i] * enu[0] + rot[1][i] * enu[1] + rot[2][i] * enu[2];
    }
    lla_from_ecef(&ecef)
}

/// A local tangent plane anchored at a reference position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopocentricConverter {
    /// Origin of the tangent plane.
    pub reference: Lla,
}

impl TopocentricConverter {
    /// Create a converter anchored at `reference`.
    pub fn new(reference: Lla) -> Self {
        Self { reference }
    }

    /// Geodetic position of local coordinates.
    pub fn to_lla(&self, enu: &[f64; 3]) -> Lla {
        lla_from_topocentric(enu, &self.reference)
    }
}

impl LocalTangentPlane for TopocentricConverter {
    fn topocentric(&self, lla: &Lla) -> [f64; 3] {
        topocentric_from_lla(lla, &self.reference)
    }
}

/// Pick a reference for a dataset without one: the mean latitude and longitude, at altitude 0.
///
/// Returns `None` when no position is given.
pub fn invent_reference<'a>(positions: impl IntoIterator<Item = &'a Lla>) -> Option<Lla> {
    let (mut lat, mut lon, mut count) = (0.0, 0.0, 0usize);
    for p in positions {
        lat += p.latitude;
        lon += p.longitude;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let reference = Lla::new(lat / count as f64, lon / count as f64, 0.0);
    log::debug!("invented reference {:?} from {} positions", reference, count);
    Some(reference)
}
