//! Static word tables used by the suggestion composer, the input shaper and
//! the text heuristics.

/// Themes offered when generating a random premise.
pub const RANDOM_THEMES: &[&str] = &[
    "Sci-Fi",
    "Fantasy",
    "Horror",
    "Post-Apocalyptic",
    "Spy Thriller",
    "Victorian Mystery",
    "Pulp Adventure",
    "Cyberpunk",
];

/// Keyword found in the last result, and the actions it suggests.
pub const KEYWORD_ACTIONS: &[(&str, &[&str])] = &[
    ("door", &["Try to open the door", "Knock on the door", "Listen at the door", "Examine the door for traps"]),
    ("chest", &["Try to open the chest", "Look for a key", "Examine the chest for traps", "Leave the chest alone"]),
    ("key", &["Pick up the key", "Try using the key on a nearby lock", "Examine the key's inscription"]),
    ("enemy", &["Attack the enemy", "Try to sneak past the enemy", "Attempt to talk to the enemy", "Look for a weakness"]),
    ("creature", &["Attack the creature", "Observe the creature from a distance", "Slowly back away"]),
    ("sword", &["Pick up the sword", "Inspect the sword for maker's marks", "Practice a few swings"]),
    ("book", &["Read the book", "Skim through the book", "Check for hidden notes in the margins"]),
    ("note", &["Read the note", "Pick up the note", "Check the other side of the note"]),
    ("path", &["Follow the path", "Examine the path for tracks", "Look for an alternate route"]),
    ("river", &["Try to swim across the river", "Look for a bridge", "Search for a shallow spot to cross"]),
    ("bridge", &["Cross the bridge carefully", "Test the bridge's stability", "Look under the bridge"]),
    ("rope", &["Climb the rope", "Pull the rope", "Cut the rope"]),
    ("lever", &["Pull the lever", "Examine the mechanism it's connected to", "Jam the lever with something"]),
    ("torch", &["Pick up the torch", "Use the torch to light up the area", "Extinguish the torch"]),
    ("potion", &["Drink the potion", "Examine the potion's color and smell", "Save the potion for later"]),
    ("scroll", &["Read the scroll", "Unfurl the scroll", "Store the scroll in your bag"]),
    ("window", &["Look out the window", "Try to open the window", "Break the window"]),
    ("guard", &["Talk to the guard", "Try to bribe the guard", "Attempt to distract the guard"]),
    ("merchant", &["Ask the merchant what they are selling", "Try to haggle with the merchant", "Ask the merchant for local rumors"]),
    ("altar", &["Kneel at the altar", "Examine the altar for offerings", "Place an item on the altar"]),
    ("statue", &["Examine the statue", "Try to push the statue", "Pray to the statue"]),
    ("trap", &["Try to disarm the trap", "Look for a way around the trap", "Mark the trap's location"]),
    ("body", &["Search the body for loot", "Examine the body for the cause of death", "Hide the body"]),
    ("map", &["Study the map", "Look for landmarks on the map", "Try to determine your position"]),
    ("wall", &["Search the wall for secret passages", "Try to climb the wall", "Listen for sounds on the other side"]),
    ("darkness", &["Wait for your eyes to adjust", "Listen carefully for any sounds", "Feel your way forward"]),
    ("computer", &["Access the computer terminal", "Look for a password", "Hack the system"]),
    ("robot", &["Activate the robot", "Deactivate the robot", "Give the robot a command"]),
    ("alien", &["Observe the alien's behavior", "Offer a gift to the alien", "Try to communicate with the alien"]),
    ("zombie", &["Attack the zombie in the head", "Shove the zombie away", "Run from the zombie"]),
    ("survivor", &["Approach the survivor cautiously", "Offer the survivor supplies", "Ask the survivor to join you"]),
    ("engine", &["Try to start the engine", "Check the fuel tank", "Look for missing parts"]),
    ("clue", &["Examine the clue closely", "Look for more clues in the area", "Pocket the clue as evidence"]),
    ("footprints", &["Follow the footprints", "Examine the footprints", "Cover your own tracks"]),
    ("safe", &["Try to crack the safe", "Look for the combination written nearby"]),
    ("diary", &["Read the diary", "Check for torn-out pages", "Look for entries written in code"]),
    ("fog", &["Proceed cautiously through the fog", "Listen for the sound of footsteps", "Hide in an alleyway"]),
    ("car", &["Get in the car", "Start the car", "Check the trunk"]),
    ("phone", &["Check the phone for messages", "Make a call", "Look through the phone's contacts"]),
];

/// An action offered when the scene mentions `trigger` and the player
/// carries `item`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryRule {
    pub trigger: &'static str,
    pub item: &'static str,
    pub action: &'static str,
}

const fn rule(trigger: &'static str, item: &'static str, action: &'static str) -> InventoryRule {
    InventoryRule {
        trigger,
        item,
        action,
    }
}

pub const INVENTORY_RULES: &[InventoryRule] = &[
    rule("locked door", "key", "Try to unlock the door with the key"),
    rule("locked door", "credit card", "Try to slip the lock with your credit card"),
    rule("stuck door", "crowbar", "Use the crowbar to pry the door open"),
    rule("locked chest", "lockpick", "Attempt to pick the lock on the chest"),
    rule("ancient inscription", "journal", "Consult your journal to translate the inscription"),
    rule("deep chasm", "whip", "Use your whip to swing across the chasm"),
    rule("darkness", "torch", "Light your torch to see"),
    rule("dark room", "lantern", "Light your lantern to illuminate the room"),
    rule("tangled vines", "machete", "Cut through the vines with your machete"),
    rule("brittle wall", "hammer", "Use the hammer to break through the wall"),
    rule("loose dirt", "shovel", "Use the shovel to dig in the loose dirt"),
    rule("riddle", "book", "Look for clues to the riddle in your book"),
    rule("ghost", "amulet", "Hold up the amulet to ward off the ghost"),
    rule("wound", "healing herb", "Apply the healing herb to your wound"),
    rule("poisoned food", "antidote", "Take the antidote to cure the poison"),
    rule("hungry animal", "food", "Offer food to the animal to pacify it"),
    rule("coded message", "cipher", "Use your cipher to decode the message"),
    rule("computer terminal", "access card", "Use the access card on the computer terminal"),
    rule("damaged robot", "repair kit", "Use the repair kit to fix the robot"),
    rule("horde of zombies", "shotgun", "Use your shotgun to clear a path through the zombies"),
    rule("barbed wire", "wire cutters", "Use the wire cutters to get through the fence"),
    rule("faint writing", "magnifying glass", "Use your magnifying glass to examine the writing"),
    rule("locked safe", "stethoscope", "Use the stethoscope to listen to the safe's tumblers"),
    rule("dark alley", "flashlight", "Use your flashlight to see in the dark alley"),
    rule("fire", "fire extinguisher", "Use the fire extinguisher to put out the fire"),
];

/// Patterns (matched against lowercased text) that mean the player died.
pub const DEATH_PATTERNS: &[&str] = &[
    r"you('re| are) (dead|killed|slain|no more|nonexistent)",
    r"you (die|pass away|perish|suffocate|drown|bleed out)",
    r"you('ve| have) (died|perished|suffocated|drowned|been (killed|slain))",
    r"you (\w* )?(yourself )?to death",
    r"you (\w* )*(collapse|bleed out|chok(e|ed|ing)|drown|dissolve) (\w* )*and (died?|pass away|cease to exist|(\w* )+killed)",
];

/// Patterns (matched against lowercased text) that mean the player won.
pub const VICTORY_PATTERNS: &[&str] = &[
    r"you ((\w* )*and )?live happily ever after",
    r"you ((\w* )*and )?live (forever|eternally|for eternity)",
    r"you ((\w* )*and )?(are|become|turn into) ((a|now) )?(deity|god|immortal)",
    r"you ((\w* )*and )?((go|get) (in)?to|arrive (at|in)) (heaven|paradise)",
    r"you ((\w* )*and )?celebrate your (victory|triumph)",
    r"you ((\w* )*and )?retire",
];

/// First-person phrases and their second-person replacements. Longer
/// phrases come first so they win over their prefixes.
pub const FIRST_TO_SECOND: &[(&str, &str)] = &[
    ("wasn't i", "weren't you"),
    ("myself", "yourself"),
    ("i was", "you were"),
    ("was i", "were you"),
    ("we're", "you're"),
    ("i'll", "you'll"),
    ("i've", "you've"),
    ("i am", "you are"),
    ("am i", "are you"),
    ("mine", "yours"),
    ("i'm", "you're"),
    ("i'd", "you'd"),
    ("our", "your"),
    ("my", "your"),
    ("me", "you"),
    ("we", "you"),
    ("us", "you"),
    ("i", "you"),
];

/// Words that end a noun phrase picked out of an acquisition sentence.
pub const PHRASE_STOP_WORDS: &[&str] = &[
    "and", "or", "but", "from", "with", "to", "into", "in", "on", "onto", "off", "of", "at",
    "that", "which", "before", "after", "then", "as", "for", "under", "behind", "near", "you",
    "your", "while", "when", "is", "was", "lying", "sitting",
];

/// Nouns that follow acquisition verbs without being items
/// ("you get the feeling ...").
pub const ABSTRACT_NOUNS: &[&str] = &[
    "feeling", "sense", "impression", "chance", "way", "time", "idea", "urge", "courage",
    "strength", "answer", "truth", "hang",
];

/// Verbs used to flavour speech on a critical failure.
pub const SAY_D01: &[&str] = &["mumble", "prattle", "incoherently say", "whine", "ramble", "wheeze"];

/// Adverbs used to flavour speech on a critical success.
pub const SAY_D20: &[&str] = &[
    "successfully",
    "persuasively",
    "expertly",
    "conclusively",
    "dramatically",
    "adroitly",
    "aptly",
];

/// Adverbs used to flavour an action on a critical failure.
pub const ACTION_D01: &[&str] = &[
    "disastrously",
    "incompetently",
    "dangerously",
    "stupidly",
    "horribly",
    "miserably",
    "sadly",
];

/// Adverbs used to flavour an action on a critical success.
pub const ACTION_D20: &[&str] = &[
    "successfully",
    "expertly",
    "conclusively",
    "adroitly",
    "aptly",
    "masterfully",
];
