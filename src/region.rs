// Rain-pattern classification and WRSI product routing.
//
// Ethiopia has three rainfall regimes. Whole regions (ADMIN1) follow one
// regime except where the lists below split them by zone (ADMIN2) or woreda
// (ADMIN3). The lists are disjoint; a unit matches at most one pattern.
use crate::types::{Crop, Season, UnitInfo};
use crate::wrsi::WrsiProduct;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fmt;

type NameSet = Lazy<HashSet<&'static str>>;

static SOMALI_SAP: NameSet = Lazy::new(|| {
    HashSet::from([
        "Jarar", "Erer", "Korahe", "Shebelle", "Dollo", "Afder", "Liben", "Nogob", "Daawa",
    ])
});

// Fafan zone straddles both pastoral regimes.
static FAFAN_NAP: NameSet = Lazy::new(|| {
    HashSet::from([
        "Gursum", "Babile", "Shabeeley", "Aw-Bare", "Kebribeyah", "Tuliguled",
        "Jigjiga City", "Wajale City", "Kebribayah Town", "Haroreys", "Harawo",
    ])
});
static FAFAN_SAP: NameSet = Lazy::new(|| HashSet::from(["Harshin", "Goljano", "Koran/Mulla"]));

static OROMIA_SAP: NameSet = Lazy::new(|| HashSet::from(["Borena"]));
static OROMIA_AG: NameSet = Lazy::new(|| {
    HashSet::from([
        "West Wellega", "East Wellega", "Ilubabor", "Jimma", "West Shewa", "North Shewa",
        "East Shewa", "Arsi", "West Hararge", "East Hararge", "Bale", "South West Shewa",
        "Buno Bedele", "West Arsi", "Kelem", "Horo Guduru", "Finfinne",
    ])
});

// Guji / West Guji woredas split between agropastoral and agricultural.
static GUJI_ZONES: NameSet = Lazy::new(|| HashSet::from(["Gujii", "West Guji"]));
static GUJI_SAP: NameSet = Lazy::new(|| {
    HashSet::from([
        "Adola", "Wadera", "Odo Shakiso", "Liben", "Saba Boru", "Gora Dola", "Negele Town",
        "Aga Wayu", "Adola Town", "Gumi Idalo", "Shakiso Town", "Bule Hora", "Kercha",
        "Dugda Dawa", "Melka Soda", "Bule Hora Town", "Suro Berguda", "Birbirsa Kojowa",
    ])
});
static GUJI_AG: NameSet = Lazy::new(|| {
    HashSet::from([
        "Uraga", "Bore", "Afele Kola", "Girja", "Ana Sora", "Haro Walabu", "Hambela Wamena",
        "Abaya", "Gelana",
    ])
});

static AG_REGIONS: NameSet = Lazy::new(|| {
    HashSet::from([
        "Tigray", "SNNPR", "Amhara", "Dire Dawa", "Harari", "Gambela", "Benshangul Gumuz",
        "Addis Ababa",
    ])
});

/// Northern Somalia regions whose second rains are Karen rather than Deyr.
static SO_KAREN_REGIONS: NameSet =
    Lazy::new(|| HashSet::from(["Woqooyi Galbeed", "Awdal", "Togdheer"]));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RainPattern {
    SouthernAgropastoral,
    NorthernAgropastoral,
    Agricultural,
}

impl RainPattern {
    pub const ALL: [RainPattern; 3] = [
        RainPattern::NorthernAgropastoral,
        RainPattern::SouthernAgropastoral,
        RainPattern::Agricultural,
    ];

    pub fn code(self) -> &'static str {
        match self {
            RainPattern::SouthernAgropastoral => "SAP",
            RainPattern::NorthernAgropastoral => "NAP",
            RainPattern::Agricultural => "AG",
        }
    }

    /// Classify an Ethiopian admin unit; `None` for units outside every list.
    pub fn classify(unit: &UnitInfo) -> Option<RainPattern> {
        let a1 = unit.admin1.as_str();
        let a2 = unit.admin2.as_str();
        let a3 = unit.admin3.as_str();
        let guji = GUJI_ZONES.contains(a2);

        if SOMALI_SAP.contains(a2)
            || (a2 == "Fafan" && FAFAN_SAP.contains(a3))
            || OROMIA_SAP.contains(a2)
            || (guji && GUJI_SAP.contains(a3))
        {
            Some(RainPattern::SouthernAgropastoral)
        } else if a1 == "Afar" || a2 == "Sitti" || (a2 == "Fafan" && FAFAN_NAP.contains(a3)) {
            Some(RainPattern::NorthernAgropastoral)
        } else if AG_REGIONS.contains(a1)
            || (a1 == "Oromia" && OROMIA_AG.contains(a2))
            || (guji && GUJI_AG.contains(a3))
        {
            Some(RainPattern::Agricultural)
        } else {
            None
        }
    }

    /// WRSI product used for this pattern, season and crop. Grains products
    /// cover every crop except maize.
    pub fn product_for(self, season: Season, crop: Crop) -> Option<WrsiProduct> {
        use RainPattern::*;
        match (season, self) {
            (Season::Meher, SouthernAgropastoral) => Some(WrsiProduct::RangeS),
            (Season::Belg, NorthernAgropastoral | SouthernAgropastoral) => {
                Some(WrsiProduct::RangeL)
            }
            (Season::Meher, _) if crop == Crop::Maize => Some(WrsiProduct::MaizeL),
            (Season::Meher, _) => Some(WrsiProduct::GrainsL),
            (Season::Belg, Agricultural) => Some(WrsiProduct::GrainsB),
            _ => None,
        }
    }
}

impl fmt::Display for RainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SecondRains {
    Deyr,
    Karen,
}

impl SecondRains {
    pub fn for_admin1(admin1: &str) -> SecondRains {
        if SO_KAREN_REGIONS.contains(admin1.trim()) {
            SecondRains::Karen
        } else {
            SecondRains::Deyr
        }
    }
}

/// WRSI product for a Somali series. Northern (Karen) areas have no crop
/// product for Gu, so rangeland WRSI stands in; Belg grains covers Karen.
pub fn somalia_product(season: Season, crop: Crop, rains: SecondRains) -> Option<WrsiProduct> {
    match (season, rains) {
        (Season::Gu, SecondRains::Deyr) if crop == Crop::Maize => Some(WrsiProduct::MaizeL),
        (Season::Gu, SecondRains::Deyr) => Some(WrsiProduct::GrainsL),
        (Season::Gu, SecondRains::Karen) => Some(WrsiProduct::RangeL),
        (Season::Deyr, SecondRains::Karen) => Some(WrsiProduct::GrainsB),
        (Season::Deyr, SecondRains::Deyr) => Some(WrsiProduct::MaizeS),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(a1: &str, a2: &str, a3: &str) -> UnitInfo {
        UnitInfo {
            admin1: a1.into(),
            admin2: a2.into(),
            admin3: a3.into(),
            ..UnitInfo::default()
        }
    }

    #[test]
    fn classifies_split_zones_by_woreda() {
        assert_eq!(
            RainPattern::classify(&unit("Somali", "Fafan", "Harshin")),
            Some(RainPattern::SouthernAgropastoral)
        );
        assert_eq!(
            RainPattern::classify(&unit("Somali", "Fafan", "Gursum")),
            Some(RainPattern::NorthernAgropastoral)
        );
        assert_eq!(
            RainPattern::classify(&unit("Oromia", "West Guji", "Bore")),
            Some(RainPattern::Agricultural)
        );
        assert_eq!(
            RainPattern::classify(&unit("Oromia", "Gujii", "Adola")),
            Some(RainPattern::SouthernAgropastoral)
        );
    }

    #[test]
    fn classifies_whole_regions() {
        assert_eq!(
            RainPattern::classify(&unit("Afar", "Zone 1", "")),
            Some(RainPattern::NorthernAgropastoral)
        );
        assert_eq!(
            RainPattern::classify(&unit("Amhara", "North Wollo", "")),
            Some(RainPattern::Agricultural)
        );
        assert_eq!(RainPattern::classify(&unit("Oromia", "Nowhere", "")), None);
    }

    #[test]
    fn routes_products() {
        use RainPattern::*;
        assert_eq!(
            SouthernAgropastoral.product_for(Season::Meher, Crop::Maize),
            Some(WrsiProduct::RangeS)
        );
        assert_eq!(
            NorthernAgropastoral.product_for(Season::Belg, Crop::Teff),
            Some(WrsiProduct::RangeL)
        );
        assert_eq!(Agricultural.product_for(Season::Meher, Crop::Maize), Some(WrsiProduct::MaizeL));
        assert_eq!(Agricultural.product_for(Season::Meher, Crop::Teff), Some(WrsiProduct::GrainsL));
        assert_eq!(Agricultural.product_for(Season::Belg, Crop::Wheat), Some(WrsiProduct::GrainsB));
        assert_eq!(Agricultural.product_for(Season::Gu, Crop::Maize), None);
    }

    #[test]
    fn somalia_second_rains() {
        assert_eq!(SecondRains::for_admin1("Awdal"), SecondRains::Karen);
        assert_eq!(SecondRains::for_admin1("Bay"), SecondRains::Deyr);
        assert_eq!(
            somalia_product(Season::Gu, Crop::Sorghum, SecondRains::Deyr),
            Some(WrsiProduct::GrainsL)
        );
        assert_eq!(
            somalia_product(Season::Deyr, Crop::Maize, SecondRains::Karen),
            Some(WrsiProduct::GrainsB)
        );
    }
}
