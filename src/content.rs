//! Content pool: topics, their option pairs, and round generation.

use rand::seq::SliceRandom;
use rand::Rng;
use url::Url;

use crate::document::Round;
use crate::error::{Result, WyrError};

/// Image service the presentation layer pre-warms option pictures from.
const IMAGE_BASE: &str = "https://loremflickr.com/400/300";

type Pair = (&'static str, &'static str);

/// Topic name → fixed pair pool, in display order.
static TOPICS: &[(&str, &[Pair])] = &[
    (
        "Food Fights",
        &[
            ("Pizza", "Burgers"),
            ("Ice Cream", "Cake"),
            ("Sushi", "Tacos"),
            ("Chocolate", "Sweets"),
            ("Breakfast", "Dinner"),
            ("Coffee", "Tea"),
            ("Pasta", "Rice"),
            ("BBQ Ribs", "Fried Chicken"),
            ("Pancakes", "Waffles"),
            ("Chips", "Popcorn"),
            ("Steak", "Lobster"),
            ("Smoothies", "Milkshakes"),
            ("Doughnuts", "Croissants"),
            ("Mac & Cheese", "Lasagna"),
            ("Nachos", "Loaded Fries"),
            ("Ice Lolly", "Ice Cream Sandwich"),
        ],
    ),
    (
        "Travel",
        &[
            ("Beach Holiday", "City Break"),
            ("Mountains", "Countryside"),
            ("Road Trip", "Cruise Ship"),
            ("Europe", "Asia"),
            ("Camping", "Luxury Hotel"),
            ("Summer Getaway", "Winter Escape"),
            ("Backpacking", "All-Inclusive"),
            ("Flight", "Train Journey"),
            ("Desert Safari", "Jungle Trek"),
            ("Amusement Park", "Water Park"),
            ("Northern Lights", "Tropical Sunset"),
            ("Ski Resort", "Surf Beach"),
            ("Solo Travel", "Group Holiday"),
            ("Airbnb", "Boutique Hotel"),
            ("Window Seat", "Aisle Seat"),
        ],
    ),
    (
        "Movies & TV",
        &[
            ("Action", "Comedy"),
            ("Marvel", "DC"),
            ("Horror", "Romance"),
            ("Netflix", "Cinema"),
            ("Star Wars", "Lord of the Rings"),
            ("Animated", "Live Action"),
            ("Series Binge", "Movie Marathon"),
            ("Sci-Fi", "Fantasy"),
            ("Documentary", "Reality TV"),
            ("Subtitles", "Dubbed"),
            ("Classic Films", "Modern Blockbusters"),
            ("Villain Wins", "Hero Wins"),
            ("Plot Twist", "Happy Ending"),
            ("Popcorn", "Pick 'n' Mix"),
            ("Opening Night", "Wait for Streaming"),
        ],
    ),
    (
        "Tech",
        &[
            ("iPhone", "Android"),
            ("PC", "Console"),
            ("PlayStation", "Xbox"),
            ("TikTok", "YouTube"),
            ("Instagram", "Snapchat"),
            ("Robot Butler", "Self-Driving Car"),
            ("VR Headset", "Drone"),
            ("Smart Watch", "Smart Glasses"),
            ("WiFi", "Unlimited Data"),
            ("Dark Mode", "Light Mode"),
            ("Mechanical Keyboard", "Touchscreen"),
            ("AI Assistant", "Human Assistant"),
            ("Video Call", "Voice Call"),
            ("Tablet", "Laptop"),
            ("Wireless Earbuds", "Over-Ear Headphones"),
        ],
    ),
    (
        "Sports & Fitness",
        &[
            ("Football", "Basketball"),
            ("Running", "Swimming"),
            ("Gym", "Outdoor Exercise"),
            ("Team Sport", "Solo Sport"),
            ("Morning Workout", "Evening Workout"),
            ("Yoga", "Weight Training"),
            ("Cricket", "Tennis"),
            ("Olympics", "World Cup"),
            ("Play Sports", "Watch Sports"),
            ("Boxing", "Martial Arts"),
            ("Rock Climbing", "Surfing"),
            ("Sprint", "Marathon"),
            ("Golf", "Bowling"),
            ("Skiing", "Snowboarding"),
            ("Dance Class", "HIIT Workout"),
        ],
    ),
    (
        "Lifestyle",
        &[
            ("Morning Person", "Night Owl"),
            ("Dogs", "Cats"),
            ("City Life", "Country Life"),
            ("Summer", "Winter"),
            ("Book", "Podcast"),
            ("Cook at Home", "Eat Out"),
            ("Sweet", "Savoury"),
            ("Bath", "Shower"),
            ("Messy Room", "Clean Freak"),
            ("Early Bird", "Late Riser"),
            ("Phone Call", "Text Message"),
            ("Big Party", "Small Gathering"),
            ("Online Shopping", "High Street"),
            ("Save Money", "Spend on Experiences"),
            ("Window Open", "AC Blasting"),
            ("Live Music", "Vinyl Records"),
        ],
    ),
    (
        "Hypothetical",
        &[
            ("Fly", "Invisibility"),
            ("Time Travel", "Teleportation"),
            ("Read Minds", "See the Future"),
            ("Live Underwater", "Live in Space"),
            ("Super Strength", "Super Speed"),
            ("Talk to Animals", "Speak All Languages"),
            ("Unlimited Money", "Unlimited Free Time"),
            ("No Internet for a Year", "No Music for a Year"),
            ("Always Hot", "Always Cold"),
            ("Live 200 Years", "Restart Life at 10"),
            ("Never Sleep", "Never Eat"),
            ("Giant Hamster", "Tiny Elephant"),
            ("No Phone", "No TV"),
            ("Zombie Apocalypse", "Alien Invasion"),
            ("Be Famous", "Be a Genius"),
        ],
    ),
    (
        "Gross!",
        &[
            ("Eat a Bug", "Lick a Lamppost"),
            ("Drink Ketchup", "Drink Mayonnaise"),
            ("Swim in Baked Beans", "Swim in Custard"),
            ("No Shower for a Week", "No Teeth Brushing for a Week"),
            ("Smell Bad Always", "Taste Nothing"),
            ("Wear Wet Socks Forever", "Have a Pebble in Your Shoe Forever"),
            ("Eat Raw Onion", "Eat Raw Garlic"),
            ("Talk in Burps", "Sneeze Glitter"),
            ("Step in Gum", "Sit on Wet Seat"),
            ("Lick the Floor", "Eat a Worm"),
            ("Sleep in Mud", "Sleep in Jelly"),
            ("Eat Dog Food", "Drink Fish Water"),
            ("Sweat Syrup", "Cry Milk"),
            ("Never Cut Nails", "Never Cut Hair"),
            ("Only Wear Crocs", "Only Wear Sandals with Socks"),
        ],
    ),
];

/// Topic names in display order.
pub fn topic_names() -> Vec<&'static str> {
    TOPICS.iter().map(|(name, _)| *name).collect()
}

/// The fixed pair pool of `topic`.
pub fn topic_pairs(topic: &str) -> Option<&'static [Pair]> {
    TOPICS
        .iter()
        .find(|(name, _)| *name == topic)
        .map(|(_, pairs)| *pairs)
}

/// Generate `count` rounds for `topic` using the thread-local RNG.
///
/// # Errors
///
/// See [`generate_rounds_with`].
pub fn generate_rounds(topic: &str, count: usize) -> Result<Vec<Round>> {
    generate_rounds_with(&mut rand::rng(), topic, count)
}

/// Generate `count` rounds for `topic`.
///
/// The topic's pool is shuffled once and cycled through when `count` exceeds its
/// size. Which member of each pair lands on the `A` side is randomized per round
/// so left/right isn't predictable.
///
/// # Errors
///
/// Returns [`WyrError::UnknownTopic`] for a topic not in [`topic_names`] and
/// [`WyrError::InvalidRoundCount`] for `count == 0`.
pub fn generate_rounds_with<R: Rng + ?Sized>(
    rng: &mut R,
    topic: &str,
    count: usize,
) -> Result<Vec<Round>> {
    let pool = topic_pairs(topic).ok_or_else(|| WyrError::UnknownTopic(topic.to_string()))?;
    if count == 0 {
        return Err(WyrError::InvalidRoundCount(count));
    }

    let mut shuffled = pool.to_vec();
    shuffled.shuffle(rng);

    let rounds = shuffled
        .iter()
        .cycle()
        .take(count)
        .map(|&(first, second)| {
            if rng.random_bool(0.5) {
                Round::new(first, second)
            } else {
                Round::new(second, first)
            }
        })
        .collect();
    Ok(rounds)
}

/// Deterministic picture URL for an option: the same option and topic always map
/// to the same URL so browsers can cache it.
pub fn image_url(option: &str, topic: &str) -> Option<Url> {
    let keywords: String = option
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    let mut url = Url::parse(IMAGE_BASE).ok()?;
    url.path_segments_mut().ok()?.push(keywords.trim());
    url.query_pairs_mut()
        .append_pair("lock", &format!("{option}{topic}"));
    Some(url)
}

/// Image URLs for both options of every round, in round order.
pub fn prefetch_urls(rounds: &[Round], topic: &str) -> Vec<Url> {
    rounds
        .iter()
        .flat_map(|round| [&round.option_a, &round.option_b])
        .filter_map(|option| image_url(option, topic))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn in_pool(pool: &[Pair], round: &Round) -> bool {
        pool.iter().any(|&(a, b)| {
            (round.option_a == a && round.option_b == b)
                || (round.option_a == b && round.option_b == a)
        })
    }

    #[test]
    fn topics_keep_display_order() {
        let names = topic_names();
        assert_eq!(names.first(), Some(&"Food Fights"));
        assert_eq!(names.last(), Some(&"Gross!"));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn every_topic_generates_exact_count_from_its_pool() {
        let mut rng = StdRng::seed_from_u64(42);
        for topic in topic_names() {
            let pool = topic_pairs(topic).unwrap();
            for count in [1, 5, pool.len(), pool.len() + 7, pool.len() * 3] {
                let rounds = generate_rounds_with(&mut rng, topic, count).unwrap();
                assert_eq!(rounds.len(), count, "{topic} x {count}");
                assert!(rounds.iter().all(|r| in_pool(pool, r)), "{topic}");
            }
        }
    }

    #[test]
    fn pool_exhaustion_cycles_in_shuffled_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let pool = topic_pairs("Travel").unwrap();
        let n = pool.len();
        let rounds = generate_rounds_with(&mut rng, "Travel", n * 2).unwrap();

        // The first pass covers every pair exactly once.
        for &(a, b) in pool {
            let hits = rounds[..n]
                .iter()
                .filter(|r| in_pool(&[(a, b)], r))
                .count();
            assert_eq!(hits, 1, "{a} / {b}");
        }
        // The second pass repeats the same pairs in the same order.
        for i in 0..n {
            let first = &rounds[i];
            let again = &rounds[i + n];
            let mut x = [first.option_a.as_str(), first.option_b.as_str()];
            let mut y = [again.option_a.as_str(), again.option_b.as_str()];
            x.sort_unstable();
            y.sort_unstable();
            assert_eq!(x, y);
        }
    }

    #[test]
    fn unknown_topic_and_zero_rounds_are_rejected() {
        assert!(matches!(
            generate_rounds("Nope", 3),
            Err(WyrError::UnknownTopic(_))
        ));
        assert!(matches!(
            generate_rounds("Tech", 0),
            Err(WyrError::InvalidRoundCount(0))
        ));
    }

    #[test]
    fn image_url_is_deterministic_and_clean() {
        let a = image_url("Mac & Cheese", "Food Fights").unwrap();
        let b = image_url("Mac & Cheese", "Food Fights").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.host_str(), Some("loremflickr.com"));
        assert!(a.path().starts_with("/400/300/Mac%20%20Cheese"));
        let lock = a
            .query_pairs()
            .find(|(key, _)| key == "lock")
            .map(|(_, value)| value.into_owned());
        assert_eq!(lock.as_deref(), Some("Mac & CheeseFood Fights"));
        assert_ne!(a, image_url("Mac & Cheese", "Travel").unwrap());
    }

    #[test]
    fn prefetch_covers_both_options_of_every_round() {
        let rounds = vec![Round::new("Pizza", "Burgers"), Round::new("Coffee", "Tea")];
        let urls = prefetch_urls(&rounds, "Food Fights");
        assert_eq!(urls.len(), 4);
        assert_eq!(urls[3], image_url("Tea", "Food Fights").unwrap());
    }
}
