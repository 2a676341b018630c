//! Solar trajectory over a day and its intersection with a mask.
//!
//! The ephemeris comes from `spa`; azimuths are converted to the compass
//! radians the mask uses (north = 0, range [−π, π)), and the zenith angle
//! becomes an elevation above the horizontal plane.

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sguaba::{Bearing, system};
use uom::si::angle::{degree, radian};
use uom::si::f64::Angle;

use crate::coord::Coord;
use crate::error::{Error, Result};
use crate::oaem::{Oaem, wrap_to_pi};

system!(pub struct ObserverEnu using ENU);

/// One ephemeris sample: where the sun stands at an instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SunSample {
    pub time: DateTime<Utc>,
    /// Compass azimuth in radians, [−π, π).
    pub azimuth: f64,
    /// Elevation above the horizon in radians; negative at night.
    pub elevation: f64,
}

/// The sun's path over a viewpoint and the visibility toggles against a
/// mask.
///
/// Constructed per request; [`SunTrack::intersect_with_oaem`] fills in the
/// change points that [`SunTrack::since`] and [`SunTrack::until`] answer
/// from.
#[derive(Clone, Debug)]
pub struct SunTrack {
    latitude: f64,
    longitude: f64,
    vis_changes: Vec<(DateTime<Utc>, bool)>,
}

impl SunTrack {
    /// Binds a viewpoint, reprojecting it to geographic coordinates once.
    pub fn new(pos: Coord) -> Result<Self> {
        let geo = pos.to_epsg(4326)?;
        if !(-90.0..=90.0).contains(&geo.y) || !(-180.0..=180.0).contains(&geo.x) {
            return Err(Error::Untransformable {
                x: pos.x,
                y: pos.y,
                epsg: 4326,
            });
        }
        Ok(Self {
            latitude: geo.y,
            longitude: geo.x,
            vis_changes: Vec::new(),
        })
    }

    /// Compass azimuth and elevation of the sun at `at`, in radians.
    pub fn position_at(&self, at: DateTime<Utc>) -> (f64, f64) {
        let solar = spa::solar_position::<spa::StdFloatOps>(at, self.latitude, self.longitude)
            // Validated on construction.
            .expect("latitude and longitude are valid");
        let azimuth = wrap_to_pi(Angle::new::<degree>(solar.azimuth).get::<radian>());
        let elevation = Angle::new::<degree>(90.0 - solar.zenith_angle).get::<radian>();
        (azimuth, elevation)
    }

    /// The sun's [`Bearing`] in the observer's east-north-up frame.
    pub fn bearing_at(&self, at: DateTime<Utc>) -> Bearing<ObserverEnu> {
        let solar = spa::solar_position::<spa::StdFloatOps>(at, self.latitude, self.longitude)
            // Validated on construction.
            .expect("latitude and longitude are valid");
        Bearing::<ObserverEnu>::builder()
            .azimuth(Angle::new::<degree>(solar.azimuth))
            .elevation(Angle::HALF_TURN / 2. - Angle::new::<degree>(solar.zenith_angle))
            .expect("solar zenith is on the range 0 to 180")
            .build()
    }

    /// Samples the sun's position over `date` (interpreted in the process
    /// local timezone) every `freq`, keeping only daylight samples when
    /// asked to.
    pub fn sun_track(&self, date: NaiveDate, freq: Duration, daylight_only: bool) -> Vec<SunSample> {
        let freq = if freq <= Duration::zero() {
            Duration::minutes(1)
        } else {
            freq
        };
        let start = local_instant(date.and_hms_opt(0, 0, 0).expect("midnight exists"));
        let end = local_instant(date.and_hms_opt(23, 59, 59).expect("23:59:59 exists"));

        let mut samples = Vec::new();
        let mut t = start;
        while t <= end {
            let (azimuth, elevation) = self.position_at(t);
            if !daylight_only || elevation > 0.0 {
                samples.push(SunSample {
                    time: t,
                    azimuth,
                    elevation,
                });
            }
            t += freq;
        }
        samples
    }

    /// Sunrise and sunset for `date`, or `None` in polar night and polar
    /// day.
    pub fn daylight_span(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let noon = local_instant(date.and_hms_opt(12, 0, 0).expect("noon exists"));
        let sunrise_and_set =
            spa::sunrise_and_set::<spa::StdFloatOps>(noon, self.latitude, self.longitude)
                // Validated on construction.
                .expect("latitude and longitude are valid");
        match sunrise_and_set {
            spa::SunriseAndSet::Daylight(rise, set) => Some((rise, set)),
            spa::SunriseAndSet::PolarNight | spa::SunriseAndSet::PolarDay => None,
        }
    }

    /// Whether the sun clears the mask at `at`.
    pub fn visible_at(&self, oaem: &Oaem, at: DateTime<Utc>) -> bool {
        let (azimuth, elevation) = self.position_at(at);
        elevation > oaem.query(azimuth)
    }

    /// Walks the day's track against `oaem` and records every sample where
    /// visibility toggled, with the visibility it toggled to.
    pub fn intersect_with_oaem(&mut self, oaem: &Oaem, date: NaiveDate) {
        let track = self.sun_track(date, Duration::minutes(1), false);
        self.vis_changes.clear();
        let mut previous: Option<bool> = None;
        for sample in &track {
            let visible = sample.elevation > oaem.query(sample.azimuth);
            if previous.is_some_and(|p| p != visible) {
                self.vis_changes.push((sample.time, visible));
            }
            previous = Some(visible);
        }
    }

    /// The recorded visibility changes, ascending in time.
    pub fn vis_changes(&self) -> &[(DateTime<Utc>, bool)] {
        &self.vis_changes
    }

    /// The most recent visibility change at or before `now`, if any.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let idx = self.vis_changes.partition_point(|(t, _)| *t <= now);
        if idx == 0 {
            None
        } else {
            Some(self.vis_changes[idx - 1].0)
        }
    }

    /// The first visibility change after `now`, if any.
    pub fn until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let idx = self.vis_changes.partition_point(|(t, _)| *t <= now);
        self.vis_changes.get(idx).map(|(t, _)| *t)
    }
}

fn local_instant(naive: NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        // A DST gap swallowed this wall-clock time.
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}
