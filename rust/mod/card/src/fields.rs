//! Domain ↔ native field names of the remote list.
//!
//! Every card attribute stored in the list's `fields` object has exactly one
//! [`CardField`]. [`CardField::native`] and [`CardField::domain`] are
//! exhaustive `match`es, so a variant without a name fails to compile;
//! uniqueness of the names is checked by the tests below.

/// A card attribute stored as a list column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardField {
    Title,
    Status,
    RequestDate,
    RequesterName,
    Department,
    Brand,
    Model,
    PartName,
    Description,
    Quantity,
    Deadline,
    PartImageUrl,
    ApplicationImageUrl,
    PartValue,
    PrintingCost,
    ProfitLoss,
    IsProfitable,
}

impl CardField {
    /// Column name in the remote list.
    pub fn native(&self) -> &'static str {
        match self {
            Self::Title => "Titulo",
            Self::Status => "Status",
            Self::RequestDate => "DataSolicitacao",
            Self::RequesterName => "NomeSolicitante",
            Self::Department => "SetorSolicitacao",
            Self::Brand => "Marca",
            Self::Model => "Modelo",
            Self::PartName => "NomePeca",
            Self::Description => "DescricaoPeca",
            Self::Quantity => "Quantidade",
            Self::Deadline => "PrazoEntrega",
            Self::PartImageUrl => "ImagemPeca",
            Self::ApplicationImageUrl => "ImagemAplicacao",
            Self::PartValue => "ValorPeca",
            Self::PrintingCost => "CustoImpressao",
            Self::ProfitLoss => "GanhoPrejuizo",
            Self::IsProfitable => "Lucrativo",
        }
    }

    /// camelCase domain name, as used in validation errors and JSON.
    pub fn domain(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Status => "status",
            Self::RequestDate => "requestDate",
            Self::RequesterName => "requesterName",
            Self::Department => "department",
            Self::Brand => "brand",
            Self::Model => "model",
            Self::PartName => "partName",
            Self::Description => "description",
            Self::Quantity => "quantity",
            Self::Deadline => "deadline",
            Self::PartImageUrl => "partImageUrl",
            Self::ApplicationImageUrl => "applicationImageUrl",
            Self::PartValue => "partValue",
            Self::PrintingCost => "printingCost",
            Self::ProfitLoss => "profitLoss",
            Self::IsProfitable => "isProfitable",
        }
    }
}

/// Legacy column some lists still use for the title.
pub const LEGACY_TITLE: &str = "Title";

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const ALL: [CardField; 17] = [
        CardField::Title,
        CardField::Status,
        CardField::RequestDate,
        CardField::RequesterName,
        CardField::Department,
        CardField::Brand,
        CardField::Model,
        CardField::PartName,
        CardField::Description,
        CardField::Quantity,
        CardField::Deadline,
        CardField::PartImageUrl,
        CardField::ApplicationImageUrl,
        CardField::PartValue,
        CardField::PrintingCost,
        CardField::ProfitLoss,
        CardField::IsProfitable,
    ];

    #[test]
    fn native_names_are_unique() {
        let natives: HashSet<_> = ALL.iter().map(|f| f.native()).collect();
        assert_eq!(natives.len(), ALL.len());
        assert!(!natives.contains(LEGACY_TITLE));
    }

    #[test]
    fn domain_names_are_unique() {
        let names: HashSet<_> = ALL.iter().map(|f| f.domain()).collect();
        assert_eq!(names.len(), ALL.len());
    }

    #[test]
    fn known_pairs() {
        assert_eq!(CardField::RequesterName.native(), "NomeSolicitante");
        assert_eq!(CardField::PrintingCost.native(), "CustoImpressao");
        assert_eq!(CardField::PrintingCost.domain(), "printingCost");
    }
}
