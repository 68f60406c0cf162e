//! Brute-force nearest-contractor ranking.

use crate::haversine_miles;
use dispatch_types::{Availability, ContractorDispatchInfo, GeoPoint, User, UserRole};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_MAX_DISTANCE_MILES: f64 = 50.0;

/// Rank contractors who can take a job right now, nearest first.
///
/// Eligible users are verified contractors marked `available` whose id is not in
/// `exclude_ids` and who are within `max_distance_miles`. Equal distances prefer the higher
/// rating, then the lower id. A token in `push_tokens` overrides the profile's token.
pub fn find_nearest_available_contractors(
    job_location: GeoPoint,
    users: &[User],
    push_tokens: &HashMap<String, String>,
    limit: usize,
    exclude_ids: &HashSet<String>,
    max_distance_miles: f64,
) -> Vec<ContractorDispatchInfo> {
    let mut candidates: Vec<ContractorDispatchInfo> = users
        .iter()
        .filter(|u| u.role == UserRole::Contractor && !exclude_ids.contains(&u.id))
        .filter_map(|u| {
            let profile = u.contractor_profile.as_ref()?;
            if profile.availability != Availability::Available || !profile.verified {
                return None;
            }
            let distance = haversine_miles(job_location, profile.location.point());
            Some(ContractorDispatchInfo {
                contractor_id: u.id.clone(),
                name: u.name.clone(),
                location: profile.location.clone(),
                distance,
                rating: profile.rating,
                completed_jobs: profile.completed_jobs,
                availability: profile.availability,
                expo_push_token: push_tokens
                    .get(&u.id)
                    .cloned()
                    .or_else(|| profile.expo_push_token.clone()),
            })
        })
        .filter(|c| c.distance <= max_distance_miles)
        .collect();
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal))
            .then_with(|| a.contractor_id.cmp(&b.contractor_id))
    });
    candidates.truncate(limit);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_types::{ContractorLocation, ContractorProfile};

    const JOB: GeoPoint = GeoPoint {
        lat: 32.7767,
        lng: -96.7970,
    };

    fn contractor(id: &str, lat_offset: f64, rating: f64) -> User {
        User {
            id: id.to_string(),
            role: UserRole::Contractor,
            name: format!("Contractor {id}"),
            email: format!("{id}@example.com"),
            contractor_profile: Some(ContractorProfile {
                rating,
                completed_jobs: 10,
                location: ContractorLocation {
                    lat: JOB.lat + lat_offset,
                    lng: JOB.lng,
                    address: String::new(),
                },
                availability: Availability::Available,
                verified: true,
                expo_push_token: None,
            }),
        }
    }

    fn none() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn ranks_by_distance_and_limits() {
        let users = vec![
            contractor("far", 0.3, 5.0),
            contractor("near", 0.01, 3.0),
            contractor("mid", 0.1, 4.0),
            contractor("mid2", 0.2, 4.0),
        ];
        let ranked =
            find_nearest_available_contractors(JOB, &users, &HashMap::new(), 3, &none(), 50.0);
        let ids: Vec<_> = ranked.iter().map(|c| c.contractor_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "mid2"]);
        assert!(ranked.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn filters_ineligible_users() {
        let mut busy = contractor("busy", 0.01, 5.0);
        busy.contractor_profile.as_mut().unwrap().availability = Availability::Busy;
        let mut unverified = contractor("unverified", 0.01, 5.0);
        unverified.contractor_profile.as_mut().unwrap().verified = false;
        let mut homeowner = contractor("homeowner", 0.01, 5.0);
        homeowner.role = UserRole::Homeowner;
        let mut no_profile = contractor("bare", 0.01, 5.0);
        no_profile.contractor_profile = None;
        let far_away = contractor("remote", 5.0, 5.0);
        let excluded = contractor("seen", 0.01, 5.0);
        let ok = contractor("ok", 0.02, 1.0);

        let users = vec![busy, unverified, homeowner, no_profile, far_away, excluded, ok];
        let exclude: HashSet<String> = ["seen".to_string()].into_iter().collect();
        let ranked = find_nearest_available_contractors(
            JOB,
            &users,
            &HashMap::new(),
            10,
            &exclude,
            DEFAULT_MAX_DISTANCE_MILES,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].contractor_id, "ok");
    }

    #[test]
    fn empty_when_nobody_eligible() {
        let users = vec![contractor("a", 0.01, 4.0)];
        let exclude: HashSet<String> = ["a".to_string()].into_iter().collect();
        let ranked =
            find_nearest_available_contractors(JOB, &users, &HashMap::new(), 3, &exclude, 50.0);
        assert!(ranked.is_empty());
    }

    #[test]
    fn equal_distance_prefers_rating() {
        let users = vec![contractor("low", 0.05, 3.0), contractor("high", 0.05, 4.9)];
        let ranked =
            find_nearest_available_contractors(JOB, &users, &HashMap::new(), 2, &none(), 50.0);
        assert_eq!(ranked[0].contractor_id, "high");
        assert_eq!(ranked[1].contractor_id, "low");
    }

    #[test]
    fn registered_token_overrides_profile_token() {
        let mut a = contractor("a", 0.01, 4.0);
        a.contractor_profile.as_mut().unwrap().expo_push_token = Some("profile-token".into());
        let mut b = contractor("b", 0.02, 4.0);
        b.contractor_profile.as_mut().unwrap().expo_push_token = Some("b-profile".into());
        let tokens: HashMap<String, String> =
            [("a".to_string(), "registered".to_string())].into_iter().collect();
        let ranked = find_nearest_available_contractors(JOB, &[a, b], &tokens, 3, &none(), 50.0);
        assert_eq!(ranked[0].expo_push_token.as_deref(), Some("registered"));
        assert_eq!(ranked[1].expo_push_token.as_deref(), Some("b-profile"));
    }
}
