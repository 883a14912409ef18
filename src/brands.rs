//! Static brand catalogue: canonical brands, their aliases and their store domains.

use std::collections::HashMap;

use once_cell::sync::Lazy;

const SHOPIFY_PATHS: &[&str] = &["/products/", "/product/"];

#[derive(Debug, PartialEq, Eq)]
pub struct BrandProfile {
    pub key: &'static str,
    pub display_name: &'static str,
    /// Store domains; empty when the brand has no site of its own.
    pub domains: &'static [&'static str],
    /// Raw spellings seen in catalog rows and on listings.
    pub aliases: &'static [&'static str],
    /// Path fragments a product page on the brand domain carries.
    pub product_paths: &'static [&'static str],
}

impl BrandProfile {
    pub fn primary_domain(&self) -> Option<&'static str> {
        self.domains.first().copied()
    }

    pub fn has_domain(&self) -> bool {
        !self.domains.is_empty()
    }

    pub fn owns_url(&self, url: &str) -> bool {
        let lowered = url.to_ascii_lowercase();
        self.domains.iter().any(|domain| lowered.contains(domain))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrandMatch {
    /// Known brand with at least one store domain.
    Mapped(&'static BrandProfile),
    /// Known brand without a store domain.
    Unmapped(&'static BrandProfile),
    Unknown,
}

impl BrandMatch {
    pub fn profile(&self) -> Option<&'static BrandProfile> {
        match self {
            BrandMatch::Mapped(profile) | BrandMatch::Unmapped(profile) => Some(profile),
            BrandMatch::Unknown => None,
        }
    }

    pub fn site_profile(&self) -> Option<&'static BrandProfile> {
        match self {
            BrandMatch::Mapped(profile) => Some(profile),
            _ => None,
        }
    }
}

macro_rules! brand {
    ($key:literal, $display:literal, [$($domain:literal),*], [$($alias:literal),*]) => {
        brand!($key, $display, [$($domain),*], [$($alias),*], SHOPIFY_PATHS)
    };
    ($key:literal, $display:literal, [$($domain:literal),*], [$($alias:literal),*], $paths:expr) => {
        BrandProfile {
            key: $key,
            display_name: $display,
            domains: &[$($domain),*],
            aliases: &[$($alias),*],
            product_paths: $paths,
        }
    };
}

pub static BRANDS: &[BrandProfile] = &[
    brand!("asian", "Asian", ["asianfootwears.com"], ["asian", "asian footwear", "asianfootwears"]),
    brand!("atom", "Atom", [], ["atom"]),
    brand!("avant", "Avant", ["avantgardeoriginal.com"], ["avant", "avant garde", "avantgarde", "avantgardeoriginal"]),
    brand!("bad_and_boujee", "Bad & Boujee", ["badandboujee.in"], ["bad boujee", "bad and boujee", "bad & boujee", "badandboujee"]),
    brand!("bauge", "Bauge", ["baugebags.com"], ["bauge", "baugebags"]),
    brand!("beeglee", "Beeglee", ["beeglee.in"], ["beeglee"]),
    brand!("bersache", "Bersache", ["bersache.com"], ["bersache"]),
    brand!("bewakoof", "Bewakoof", ["bewakoof.com"], ["bewakoof", "bwkf"], &["/p/", "/product/", "/buy"]),
    brand!("blackberrys", "Blackberrys", ["blackberrys.com"], ["blackberrys", "blackberry"]),
    brand!("bummer", "Bummer", ["bummer.in"], ["bummer"]),
    brand!("campus_sutra", "Campus Sutra", ["campussutra.com"], ["campus sutra", "campussutra", "campus"]),
    brand!("chapter_2", "Chapter 2", ["chapter2drip.com"], ["chapter 2", "chapter2", "chapter two"]),
    brand!("chumbak", "Chumbak", ["chumbak.com"], ["chumbak"]),
    brand!("chupps", "Chupps", ["chupps.com"], ["chupps"]),
    brand!("color_capital", "Color Capital", ["colorcapital.in"], ["color capital", "colorcapital"]),
    brand!("crazybee", "Crazybee", ["mavinclub.com"], ["crazybee", "mavin", "mavinclub"]),
    brand!("cult", "Cult", [], ["cult"]),
    brand!("ecoright", "EcoRight", ["ecoright.com"], ["ecoright", "eco right"]),
    brand!("freehand", "Freehand", [], ["freehand", "free hand"]),
    brand!("guns_and_sons", "Guns & Sons", ["gunsnsons.com"], ["guns and sons", "guns & sons", "gunsnsons", "guns sons"]),
    brand!("haute_sauce", "Haute Sauce", ["buyhautesauce.com"], ["haute sauce", "hautesauce"]),
    brand!("highlander", "Highlander", [], ["highlander"]),
    brand!("indian_garage_co", "The Indian Garage Co", ["tigc.in"], ["the indian garage co", "indian garage co", "indian garage company", "the indian garage company", "the indian garage", "indiangarage", "indian garage", "tigc"], &["/products/"]),
    brand!("jar_gold", "Jar Gold", [], ["jar gold", "jargold"]),
    brand!("jockey", "Jockey", ["jockey.in"], ["jockey"]),
    brand!("just_lil_things", "Just Lil Things", ["justlilthings.in"], ["just lil things", "justlilthings"]),
    brand!("kedias", "Kedias", [], ["kedias"]),
    brand!("lancer", "Lancer", [], ["lancer"]),
    brand!("levis", "Levi's", ["levi.in"], ["levis", "levi", "levi's"], &["/products/", "/product/", "/in-en/p/"]),
    brand!("locomotive", "Locomotive", [], ["locomotive"]),
    brand!("main_character", "Main Character", ["maincharacterindia.com"], ["main character", "maincharacter"]),
    brand!("minute_mirth", "Minute Mirth", [], ["minute mirth", "minutemirth"]),
    brand!("mydesignation", "MyDesignation", ["mydesignation.com"], ["mydesignation", "my designation", "designation"], &["/products/"]),
    brand!("mywishbag", "MyWishBag", ["mywishbag.com"], ["mywishbag", "my wish bag"]),
    brand!("nailinit", "Nailinit", ["nailin.it"], ["nailinit", "nail in it"]),
    brand!("palmonas", "Palmonas", ["palmonas.com"], ["palmonas"]),
    brand!("pinacolada", "Pina Colada", ["buypinacolada.com"], ["pinacolada", "pina colada"]),
    brand!("puma", "Puma", ["in.puma.com"], ["puma"], &["/products/", "/product/", "/in/en/"]),
    brand!("qissa", "Qissa", ["shopqissa.com"], ["qissa", "shopqissa"]),
    brand!("rapidbox", "Rapidbox", ["rapidbox.in"], ["rapidbox", "rapid box"]),
    brand!("recast", "Recast", ["recast.co.in"], ["recast"]),
    brand!("salty", "Salty", ["salty.co.in"], ["salty"]),
    brand!("sassafras", "Sassafras", ["sassafras.in"], ["sassafras", "sassafras basics", "sassafras worklyf", "mascln", "mascln sassafras", "mascln by sassafras", "shae", "shae by sassafras", "pink paprika", "pink paprika by sassafras"], &["/products/"]),
    brand!("silisoul", "Silisoul", ["silisoul.com"], ["silisoul"]),
    brand!("styli", "Styli", ["stylishop.com", "styli.in"], ["styli", "stylishop"]),
    brand!("the_bear_house", "The Bear House", ["thebearhouse.com", "bearhouseindia.com", "thebearhouse.in"], ["the bear house", "bear house", "bearhouse", "thebearhouse", "bearhouseindia", "the bear house india"]),
    brand!("bearcompany", "The Bear Company", ["bearcompany.in", "thebearcompany.com"], ["the bear company", "bear company", "bearcompany", "bearco"]),
    brand!("the_kurta", "The Kurta Company", ["thekurtacompany.com"], ["the kurta company", "the kurta", "kurta"]),
    brand!("theater", "Theater", ["theater.xyz"], ["theater", "theatre"]),
    brand!("thela_gaadi", "Thela Gaadi", ["thelagaadi.com"], ["thela gaadi", "thelagaadi"]),
    brand!("the_souled_store", "The Souled Store", ["thesouledstore.com"], ["the souled store", "souled store", "tss", "the souled store official"]),
    brand!("tokyo_talkies", "Tokyo Talkies", [], ["tokyo talkies", "tokyotalkies"]),
    brand!("untung", "Untung", ["untung.in"], ["untung"]),
    brand!("vara_vishudh", "Vara by Vishudh", [], ["vara by vishudh", "vara"]),
    brand!("vishudh", "Vishudh", [], ["vishudh"]),
    brand!("xyxx", "XYXX", ["xyxxcrew.com"], ["xyxx", "xyxx crew"]),
    brand!("aatmana", "Aatmana", ["akshahandmadejewelry.com"], ["aatmana", "aksha handmade jewelry", "aksha"]),
    brand!("technosport", "Technosport", ["technosport.in"], ["technosport"]),
    brand!("veirdo", "Veirdo", ["veirdo.in"], ["veirdo"]),
];

/// Raw names containing one of these fragments belong to the Sassafras family.
const SASSAFRAS_FAMILY: &[&str] = &["sassafras", "mascln", "shae", "paprika"];

static ALIAS_INDEX: Lazy<HashMap<String, &'static BrandProfile>> = Lazy::new(|| {
    let mut index = HashMap::new();
    for profile in BRANDS {
        index.entry(compact(profile.key)).or_insert(profile);
        index.entry(compact(profile.display_name)).or_insert(profile);
        for alias in profile.aliases {
            index.entry(compact(alias)).or_insert(profile);
        }
    }
    index
});

/// Lowercases and drops everything that is not a letter or digit.
pub fn compact(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn normalize_brand(raw: &str) -> BrandMatch {
    let key = compact(raw);
    if key.is_empty() {
        return BrandMatch::Unknown;
    }

    let profile = ALIAS_INDEX.get(&key).copied().or_else(|| {
        SASSAFRAS_FAMILY
            .iter()
            .any(|fragment| key.contains(fragment))
            .then(|| profile_by_key("sassafras"))
            .flatten()
    });

    match profile {
        Some(profile) if profile.has_domain() => BrandMatch::Mapped(profile),
        Some(profile) => BrandMatch::Unmapped(profile),
        None => BrandMatch::Unknown,
    }
}

pub fn profile_by_key(key: &str) -> Option<&'static BrandProfile> {
    BRANDS.iter().find(|profile| profile.key == key)
}

/// Finds the catalogue brand whose store serves `url`.
pub fn profile_for_url(url: &str) -> Option<&'static BrandProfile> {
    BRANDS.iter().find(|profile| profile.owns_url(url))
}
